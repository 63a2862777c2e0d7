// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod options;

use crate::{Converter, Error, Result};
use crate::OperationKind::{Close, Flush};
use crate::streams::{State, Stream, StreamExt};
pub use options::*;

/// A fixed block of bytes, filled at the tail and drained from the head.
#[derive(Debug)]
struct Block {
	data: Box<[u8]>,
	head: usize,
	tail: usize,
}

impl Block {
	fn new(capacity: usize) -> Self {
		Self {
			data: vec![0; capacity].into_boxed_slice(),
			head: 0,
			tail: 0,
		}
	}

	fn capacity(&self) -> usize { self.data.len() }

	fn len(&self) -> usize { self.tail - self.head }

	fn is_empty(&self) -> bool { self.head == self.tail }

	fn pending(&self) -> &[u8] { &self.data[self.head..self.tail] }

	fn clear(&mut self) {
		self.head = 0;
		self.tail = 0;
	}
}

/// A stream decorator batching small reads and writes into fewer, larger calls
/// on its source.
///
/// Reads fill a read block from the source with one call, serving requests from
/// it until it runs out. Writes collect in a write block, which is written to the
/// source once full, on [`flush`](Stream::flush), or on [`close`](Stream::close).
/// Requests too large for a block go straight to the source. Both block sizes
/// are set with [`BufferOptions`].
///
/// Buffered writes are only guaranteed to reach the source if the buffer is
/// flushed, closed, or unwrapped with [`into_inner`](Self::into_inner). Dropping
/// the buffer attempts a flush, logging any bytes it couldn't deliver.
#[derive(Debug)]
pub struct Buffer<S: Stream> {
	base: Option<Converter<S>>,
	read_block: Block,
	write_block: Block,
}

impl<S: Stream> Buffer<S> {
	/// Creates a buffer with the default options.
	pub fn new(source: S) -> Self {
		Self::with_options(source, BufferOptions::new())
	}

	/// Creates a buffer with custom `options`.
	pub fn with_options(source: S, options: BufferOptions) -> Self {
		Self {
			base: Some(source.into()),
			read_block: Block::new(options.read_capacity()),
			write_block: Block::new(options.write_capacity()),
		}
	}

	/// Returns a reference to the source.
	pub fn get_ref(&self) -> &S { self.base().get_ref() }

	/// Returns a mutable reference to the source. Buffered data is not flushed.
	pub fn get_mut(&mut self) -> &mut S { self.base_mut().get_mut() }

	/// Returns the number of bytes read ahead but not yet consumed.
	pub fn buffered_read(&self) -> usize { self.read_block.len() }

	/// Returns the number of bytes written but not yet delivered to the source.
	pub fn pending_write(&self) -> usize { self.write_block.len() }

	/// Flushes pending writes, then returns the source. Any bytes read ahead are
	/// discarded.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if pending bytes couldn't be written. The
	/// source is dropped along with them.
	pub fn into_inner(mut self) -> Result<S> {
		let flushed = self.flush_write();
		let lost = self.write_block.len();
		self.write_block.clear();
		let source = self.take_base().into_inner();
		if flushed {
			Ok(source)
		} else {
			tracing::error!(lost, "buffered bytes were lost while unwrapping");
			Err(Error::data_loss(Flush))
		}
	}

	fn base(&self) -> &Converter<S> {
		unsafe {
			// Safety: the option will only be None if into_inner is called, but this
			// consumes and drops self.
			self.base.as_ref().unwrap_unchecked()
		}
	}

	fn base_mut(&mut self) -> &mut Converter<S> {
		unsafe {
			// Safety: see base.
			self.base.as_mut().unwrap_unchecked()
		}
	}

	fn take_base(&mut self) -> Converter<S> {
		unsafe {
			// Safety: see base. Drop checks for None.
			self.base.take().unwrap_unchecked()
		}
	}

	fn parts(&mut self) -> (&mut Converter<S>, &mut Block, &mut Block) {
		let Self { base, read_block, write_block } = self;
		let base = unsafe {
			// Safety: see base.
			base.as_mut().unwrap_unchecked()
		};
		(base, read_block, write_block)
	}

	/// Writes pending bytes to the source, retrying partial writes. Returns `true`
	/// if nothing is left pending. Bytes that couldn't be written are kept and the
	/// state is set to [`Fail`](State::Fail).
	fn flush_write(&mut self) -> bool {
		let (base, _, block) = self.parts();
		if !block.is_empty() {
			let written = base.write_fully(block.pending());
			block.head += written;
			if !block.is_empty() {
				base.set_state(State::Fail);
				return false
			}
			block.clear();
		}
		base.set_state(State::Ok);
		true
	}
}

/// Sets the state after a short read; a partial read is still a success.
fn finish_read<S: Stream>(base: &mut Converter<S>, read: usize) -> usize {
	let state = if read > 0 { State::Ok } else { base.get_ref().state() };
	base.set_state(state);
	read
}

impl<S: Stream> Stream for Buffer<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let (base, block, _) = self.parts();
		let mut read = 0;
		loop {
			let pending = block.pending();
			let remaining = buf.len() - read;
			if remaining <= pending.len() {
				buf[read..].copy_from_slice(&pending[..remaining]);
				block.head += remaining;
				base.set_state(State::Ok);
				return buf.len()
			}

			buf[read..read + pending.len()].copy_from_slice(pending);
			read += pending.len();
			let remaining = buf.len() - read;
			block.clear();

			if remaining > block.capacity() {
				read += base.get_mut().read(&mut buf[read..]);
				return finish_read(base, read)
			}

			block.tail = base.get_mut().read(&mut block.data);
			if block.tail < block.capacity() && block.tail < remaining {
				let count = block.tail;
				buf[read..read + count].copy_from_slice(&block.data[..count]);
				block.head = count;
				read += count;
				return finish_read(base, read)
			}
		}
	}

	/// Writes `buf` into the write block, delivering the block to the source when
	/// it fills. A zero-length write flushes the block, then is passed on to the
	/// source.
	fn write(&mut self, buf: &[u8]) -> usize {
		if buf.is_empty() {
			if !self.flush_write() { return 0 }
			return self.base_mut().write(buf)
		}

		let (base, _, block) = self.parts();
		let mut written = 0;
		loop {
			let pending = &buf[written..];
			let available = block.capacity() - block.tail;
			if pending.len() <= available {
				block.data[block.tail..block.tail + pending.len()].copy_from_slice(pending);
				block.tail += pending.len();
				base.set_state(State::Ok);
				return buf.len()
			}

			block.data[block.tail..].copy_from_slice(&pending[..available]);
			block.tail += available;
			written += available;

			if !block.is_empty() {
				let flushed = base.write_fully(block.pending());
				block.head += flushed;
				if !block.is_empty() {
					base.set_state(State::Fail);
					return written
				}
				block.clear();
			}

			if buf.len() - written > block.capacity() {
				return written + base.write(&buf[written..])
			}
		}
	}

	fn flush(&mut self) -> Result {
		if !self.flush_write() {
			return Err(Error::state(Flush, State::Fail))
		}
		self.base_mut().flush()
	}

	/// Flushes pending writes, then closes the source. Read-ahead bytes are
	/// discarded.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if pending bytes couldn't be written, after
	/// closing the source regardless.
	fn close(&mut self) -> Result {
		let flushed = self.flush_write();
		let (base, read_block, write_block) = self.parts();
		read_block.clear();
		let lost = write_block.len();
		write_block.clear();
		let closed = base.close();
		if !flushed {
			tracing::warn!(lost, "buffered bytes were lost while closing");
			base.set_state(State::Fail);
			return Err(Error::data_loss(Close))
		}
		closed
	}

	fn state(&self) -> State { self.base().state() }
}

impl<S: Stream> Drop for Buffer<S> {
	fn drop(&mut self) {
		if self.base.is_none() || self.write_block.is_empty() { return }

		if !self.flush_write() {
			tracing::error!(
				lost = self.write_block.len(),
				"buffered bytes were lost while dropping"
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{Fifo, MemoryFile, SeekableExt};
	use super::*;

	/// Counts calls made to a stream.
	#[derive(Default)]
	struct Counted<S> {
		inner: S,
		reads: usize,
		writes: usize,
	}

	impl<S: Stream> Stream for Counted<S> {
		fn read(&mut self, buf: &mut [u8]) -> usize {
			self.reads += 1;
			self.inner.read(buf)
		}

		fn write(&mut self, buf: &[u8]) -> usize {
			self.writes += 1;
			self.inner.write(buf)
		}

		fn flush(&mut self) -> Result { self.inner.flush() }
		fn close(&mut self) -> Result { self.inner.close() }
		fn state(&self) -> State { self.inner.state() }
	}

	/// Keeps written bytes, recording how many had arrived when it was closed.
	#[derive(Default)]
	struct Sink {
		data: Vec<u8>,
		len_at_close: Option<usize>,
	}

	impl Stream for Sink {
		fn read(&mut self, _: &mut [u8]) -> usize { 0 }

		fn write(&mut self, buf: &[u8]) -> usize {
			self.data.extend_from_slice(buf);
			buf.len()
		}

		fn flush(&mut self) -> Result { Ok(()) }

		fn close(&mut self) -> Result {
			self.len_at_close = Some(self.data.len());
			Ok(())
		}

		fn state(&self) -> State { State::Ok }
	}

	#[test]
	fn close_writes_pending_first() -> Result {
		let mut buffer = Buffer::with_options(Sink::default(), BufferOptions::new().with_write_capacity(64));
		buffer.write(b"pending ");
		buffer.write(b"bytes");
		assert_eq!(buffer.pending_write(), 13);
		assert!(buffer.get_ref().data.is_empty());

		buffer.close()?;
		assert_eq!(buffer.pending_write(), 0);
		assert_eq!(buffer.get_ref().data, b"pending bytes");
		assert_eq!(buffer.get_ref().len_at_close, Some(13));
		Ok(())
	}

	#[test]
	fn reads_ahead() {
		let data: Vec<u8> = (0..100).collect();
		let source = Counted { inner: MemoryFile::from_vec(data.clone()), ..Default::default() };
		let mut buffer = Buffer::with_options(source, BufferOptions::new().with_read_capacity(32));

		let mut actual = Vec::new();
		let mut chunk = [0; 5];
		loop {
			let count = buffer.read(&mut chunk);
			actual.extend_from_slice(&chunk[..count]);
			if !buffer.ok() { break }
		}
		assert_eq!(actual, data);
		assert_eq!(buffer.state(), State::Eof);
		// Four full blocks, one with the remaining 4 bytes, then end-of-stream.
		assert_eq!(buffer.get_ref().reads, 5);
	}

	#[test]
	fn large_read_bypasses() {
		let source = Counted { inner: MemoryFile::from_vec(vec![7; 64]), ..Default::default() };
		let mut buffer = Buffer::with_options(source, BufferOptions::new().with_read_capacity(8));
		let mut data = [0; 40];
		assert_eq!(buffer.read(&mut data), 40);
		assert_eq!(buffer.buffered_read(), 0);
		assert_eq!(buffer.get_ref().reads, 1);
	}

	#[test]
	fn collects_writes() -> Result {
		let mut buffer = Buffer::with_options(
			Counted::<Fifo>::default(),
			BufferOptions::new().with_write_capacity(16)
		);
		for _ in 0..3 {
			assert_eq!(buffer.write(b"abcd"), 4);
		}
		assert_eq!(buffer.get_ref().writes, 0);
		assert_eq!(buffer.pending_write(), 12);

		assert_eq!(buffer.write(b"efghijkl"), 8);
		assert_eq!(buffer.get_ref().writes, 1);
		assert_eq!(buffer.pending_write(), 4);

		buffer.flush()?;
		assert_eq!(buffer.get_ref().writes, 2);
		assert_eq!(buffer.get_mut().inner.read_remainder(64), b"abcdabcdabcdefghijkl");
		Ok(())
	}

	#[test]
	fn null_write_flushes() {
		let mut buffer = Buffer::new(Counted::<Fifo>::default());
		buffer.write(b"data");
		assert_eq!(buffer.write(&[]), 0);
		assert!(buffer.ok());
		assert_eq!(buffer.pending_write(), 0);
		assert_eq!(buffer.get_ref().writes, 2);
	}

	#[test]
	fn drop_flushes() {
		let mut file = MemoryFile::default();
		{
			let mut buffer = Buffer::new(&mut file);
			buffer.write(b"dropped");
		}
		file.reset();
		assert_eq!(file.read_remainder(16), b"dropped");
	}

	#[test]
	fn into_inner_flushes() -> Result {
		let mut buffer = Buffer::new(MemoryFile::default());
		buffer.write(b"unwrapped");
		assert_eq!(buffer.into_inner()?.into_vec(), b"unwrapped");
		Ok(())
	}
}
