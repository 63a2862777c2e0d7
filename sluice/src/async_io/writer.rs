// SPDX-License-Identifier: Apache-2.0

use std::thread::JoinHandle;
use crate::{Converter, DEFAULT_ASYNC_LIMIT, Error, Result};
use crate::OperationKind::{Close, Flush};
use crate::ring::{Consumer, Producer, RingBuffer};
use crate::streams::{Shared, State, Stream};
use super::{join, spawn, unshare};

/// A stream decorator writing behind to its source on a background thread.
///
/// Writes copy into a ring of `N` bytes, blocking only while it's full. The
/// worker drains the ring into the source until a source write fails, after
/// which writes come up short with [`Fail`](State::Fail). Reads go to the source
/// directly.
///
/// Bytes accepted by [`write`](Stream::write) are only known to be delivered
/// after a successful [`flush`](Stream::flush), [`close`](Stream::close), or
/// [`into_inner`](Self::into_inner). Dropping the writer waits for the ring to
/// drain, then stops the worker, logging any bytes it couldn't deliver.
#[derive(Debug)]
pub struct AsyncWriter<S: Stream + Send + 'static, const N: usize = DEFAULT_ASYNC_LIMIT> {
	base: Converter<Shared<S>>,
	ring: Producer<N>,
	worker: Option<JoinHandle<()>>,
}

impl<S: Stream + Send + 'static> AsyncWriter<S> {
	/// Starts writing behind to `source` with the default ring capacity.
	pub fn new(source: S) -> Result<Self> {
		Self::spawn(source)
	}
}

impl<S: Stream + Send + 'static, const N: usize> AsyncWriter<S, N> {
	/// Starts writing behind to `source` with a ring capacity of `N` bytes.
	pub fn spawn(source: S) -> Result<Self> {
		let base = Converter::new(Shared::new(source));
		let (producer, consumer) = RingBuffer::<N>::new().split();
		let shared = base.get_ref().clone();
		let worker = spawn("sluice-async-writer", move || write_behind(shared, consumer))?;
		Ok(Self {
			base,
			ring: producer,
			worker: Some(worker),
		})
	}

	/// Returns the number of bytes accepted but not yet written to the source.
	pub fn pending(&self) -> usize { self.ring.len() }

	/// Waits for pending bytes to be written, then returns the source.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if pending bytes couldn't be written. The
	/// source is dropped along with them.
	pub fn into_inner(mut self) -> Result<S> {
		let stopped = self.shutdown();
		let source = self.base.get_ref().clone();
		drop(self);
		stopped?;
		unshare(source)
	}

	/// Drains the ring, stops the worker, then checks for undelivered bytes.
	fn shutdown(&mut self) -> Result {
		if self.worker.is_none() { return Ok(()) }

		self.ring.sync();
		self.ring.quit();
		join(&mut self.worker);
		match self.ring.len() {
			0 => Ok(()),
			lost => {
				tracing::error!(lost, "write-behind bytes were lost");
				self.base.set_state(State::Fail);
				Err(Error::data_loss(Close))
			}
		}
	}
}

fn write_behind<S: Stream, const N: usize>(source: Shared<S>, mut ring: Consumer<N>) {
	loop {
		let Some(peeked) = ring.front() else { break };
		let (count, state) = {
			let mut source = source.acquire();
			let count = source.write(&peeked);
			(count, source.state())
		};
		peeked.pop(count);
		if !state.is_ok() {
			tracing::warn!(%state, "write-behind stopped");
			ring.quit();
			break
		}
	}
}

impl<S: Stream + Send + 'static, const N: usize> Stream for AsyncWriter<S, N> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		self.base.read(buf)
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		let mut written = 0;
		while written < buf.len() {
			let Some(mut region) = self.ring.back() else {
				self.base.set_state(State::Fail);
				return written
			};

			let count = region.len().min(buf.len() - written);
			region[..count].copy_from_slice(&buf[written..written + count]);
			region.push(count);
			written += count;
		}

		let state = if self.ring.is_quit() && buf.is_empty() { State::Fail } else { State::Ok };
		self.base.set_state(state);
		written
	}

	/// Waits for pending bytes to be written, then flushes the source.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if the worker stopped with bytes still pending,
	/// or a failure if it stopped after a failed write.
	fn flush(&mut self) -> Result {
		self.ring.sync();
		if self.ring.is_quit() {
			self.base.set_state(State::Fail);
			return Err(if self.ring.is_empty() {
				Error::state(Flush, State::Fail)
			} else {
				Error::data_loss(Flush)
			})
		}
		self.base.flush()
	}

	/// Waits for pending bytes to be written, stops the worker, then closes the
	/// source.
	fn close(&mut self) -> Result {
		let stopped = self.shutdown();
		let closed = self.base.close();
		if stopped.is_err() {
			self.base.set_state(State::Fail);
		}
		stopped.and(closed)
	}

	fn state(&self) -> State { self.base.state() }
}

impl<S: Stream + Send + 'static, const N: usize> Drop for AsyncWriter<S, N> {
	fn drop(&mut self) {
		// Lost bytes are logged by shutdown.
		let _ = self.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::ErrorKind;
	use crate::streams::{Fifo, StreamExt};
	use super::*;

	/// Accepts a fixed number of bytes, then fails.
	struct Capped(usize);

	impl Stream for Capped {
		fn read(&mut self, _: &mut [u8]) -> usize { 0 }

		fn write(&mut self, buf: &[u8]) -> usize {
			let count = buf.len().min(self.0);
			self.0 -= count;
			count
		}

		fn flush(&mut self) -> Result { Ok(()) }
		fn close(&mut self) -> Result { Ok(()) }

		fn state(&self) -> State {
			if self.0 == 0 { State::Fail } else { State::Ok }
		}
	}

	#[test]
	fn flush_delivers() -> Result {
		let mut writer = AsyncWriter::<_, 8>::spawn(Fifo::default())?;
		assert_eq!(writer.write(b"write-behind"), 12);
		writer.flush()?;
		assert_eq!(writer.pending(), 0);
		let mut fifo = writer.into_inner()?;
		assert_eq!(fifo.read_remainder(64), b"write-behind");
		Ok(())
	}

	#[test]
	fn failed_source_loses_data() {
		let mut writer = AsyncWriter::<_, 64>::spawn(Capped(4)).unwrap();
		assert_eq!(writer.write(b"0123456789"), 10);
		let error = writer.flush().unwrap_err();
		assert_eq!(error.kind(), ErrorKind::DataLoss);
		assert_eq!(writer.write(b"more"), 0);
		assert_eq!(writer.state(), State::Fail);
		assert!(writer.close().unwrap_err().is_data_loss());
	}
}
