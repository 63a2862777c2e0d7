// SPDX-License-Identifier: Apache-2.0

use std::thread::JoinHandle;
use crate::{Converter, DEFAULT_ASYNC_LIMIT, Result};
use crate::ring::{Consumer, Producer, RingBuffer};
use crate::streams::{Shared, State, Stream};
use super::{join, spawn, unshare};

/// A stream decorator reading ahead from its source on a background thread.
///
/// The worker fills a ring of `N` bytes from the source until the source stops
/// being [`Ok`](State::Ok). Reads block until they're satisfied or the worker
/// stops; a short read after that takes the source's state, unless some bytes
/// were delivered. Writes and flushes go to the source directly.
///
/// Dropping the reader stops the worker and waits for it. A worker blocked in a
/// source read is not interrupted, it's waited on until the read returns.
#[derive(Debug)]
pub struct AsyncReader<S: Stream + Send + 'static, const N: usize = DEFAULT_ASYNC_LIMIT> {
	base: Converter<Shared<S>>,
	ring: Consumer<N>,
	worker: Option<JoinHandle<()>>,
}

impl<S: Stream + Send + 'static> AsyncReader<S> {
	/// Starts reading ahead from `source` with the default ring capacity.
	pub fn new(source: S) -> Result<Self> {
		Self::spawn(source)
	}
}

impl<S: Stream + Send + 'static, const N: usize> AsyncReader<S, N> {
	/// Starts reading ahead from `source` with a ring capacity of `N` bytes.
	pub fn spawn(source: S) -> Result<Self> {
		let base = Converter::new(Shared::new(source));
		let (producer, consumer) = RingBuffer::<N>::new().split();
		let shared = base.get_ref().clone();
		let worker = spawn("sluice-async-reader", move || read_ahead(shared, producer))?;
		Ok(Self {
			base,
			ring: consumer,
			worker: Some(worker),
		})
	}

	/// Stops reading ahead, returning the source. Bytes already read ahead are
	/// discarded, so the source is positioned past them.
	pub fn into_inner(mut self) -> Result<S> {
		self.shutdown();
		let source = self.base.get_ref().clone();
		drop(self);
		unshare(source)
	}

	fn shutdown(&mut self) {
		if self.worker.is_some() {
			self.ring.quit();
			join(&mut self.worker);
		}
	}
}

fn read_ahead<S: Stream, const N: usize>(source: Shared<S>, mut ring: Producer<N>) {
	loop {
		let Some(mut region) = ring.back() else { break };
		let (count, state) = {
			let mut source = source.acquire();
			let count = source.read(&mut region);
			(count, source.state())
		};
		region.push(count);
		if !state.is_ok() {
			tracing::trace!(%state, "read-ahead stopped");
			ring.quit();
			break
		}
	}
}

impl<S: Stream + Send + 'static, const N: usize> Stream for AsyncReader<S, N> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		if self.worker.is_none() {
			self.base.set_state(State::Fail);
			return 0
		}
		if buf.is_empty() {
			self.base.set_state(State::Ok);
			return 0
		}

		let mut read = 0;
		while read < buf.len() {
			let Some(peeked) = self.ring.front() else {
				let state = if read > 0 { State::Ok } else { self.base.get_ref().state() };
				self.base.set_state(state);
				return read
			};

			let count = peeked.len().min(buf.len() - read);
			buf[read..read + count].copy_from_slice(&peeked[..count]);
			peeked.pop(count);
			read += count;
		}
		self.base.set_state(State::Ok);
		read
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		self.base.write(buf)
	}

	fn flush(&mut self) -> Result {
		self.base.flush()
	}

	/// Stops reading ahead, then closes the source.
	fn close(&mut self) -> Result {
		self.shutdown();
		self.base.close()
	}

	fn state(&self) -> State { self.base.state() }
}

impl<S: Stream + Send + 'static, const N: usize> Drop for AsyncReader<S, N> {
	fn drop(&mut self) {
		self.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{Fifo, MemoryFile, StreamExt};
	use super::*;

	#[test]
	fn reads_everything() -> Result {
		let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();
		let mut reader = AsyncReader::<_, 64>::spawn(MemoryFile::from_vec(data.clone()))?;
		assert_eq!(reader.read_remainder(usize::MAX), data);
		assert_eq!(reader.state(), State::Eof);
		Ok(())
	}

	#[test]
	fn empty_source() -> Result {
		let mut reader = AsyncReader::<_, 16>::spawn(Fifo::default())?;
		assert_eq!(reader.read_byte(), None);
		assert_eq!(reader.state(), State::Eof);
		assert_eq!(reader.read(&mut []), 0);
		assert!(reader.ok());
		Ok(())
	}

	#[test]
	fn closed_reader_fails() -> Result {
		let mut reader = AsyncReader::new(MemoryFile::from_vec(vec![1; 8]))?;
		reader.close()?;
		let mut buf = [0; 4];
		assert_eq!(reader.read(&mut buf), 0);
		assert_eq!(reader.state(), State::Fail);
		Ok(())
	}
}
