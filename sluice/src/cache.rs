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

use std::time::SystemTime;
use crate::{Converter, Error, Result};
use crate::OperationKind::{Close, Flush, Other, Truncate};
use crate::streams::{SeekableStream, SeekOffset, State, Stream, StreamExt};
pub use options::*;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum Status {
	#[default]
	Empty,
	/// The block matches the source.
	Loaded,
	/// The block was written to and must be written back.
	Dirty,
}

/// The resident block. Valid data spans `start..end`; `start` is a multiple of
/// the block size, bytes past `end` are zero.
#[derive(Debug)]
struct Block {
	data: Box<[u8]>,
	status: Status,
	start: u64,
	end: u64,
}

impl Block {
	fn new(size: usize) -> Self {
		Self {
			data: vec![0; size].into_boxed_slice(),
			status: Status::Empty,
			start: 0,
			end: 0,
		}
	}

	fn size(&self) -> u64 { self.data.len() as u64 }

	fn is_resident(&self) -> bool { self.status != Status::Empty }

	fn contains(&self, pos: u64) -> bool {
		(self.start..self.end).contains(&pos)
	}

	/// Returns `true` if the block is resident and shares bytes with
	/// `start..end`.
	fn overlaps(&self, start: u64, end: u64) -> bool {
		self.is_resident() && self.start < end && start < self.start + self.size()
	}

	fn valid(&self) -> &[u8] {
		&self.data[..(self.end - self.start) as usize]
	}
}

/// A write-back cache holding one block of a seekable source in memory.
///
/// The cache keeps its own logical position; seeking never reaches the source.
/// Reads and writes within the resident block are served from memory. Moving
/// outside it writes the block back if it was modified, then loads the block
/// under the new position. Transfers spanning several blocks go straight to the
/// source up to the last block, which is then loaded.
///
/// Modified data is only known to reach the source after a successful
/// [`flush`](Stream::flush), [`close`](Stream::close), or
/// [`into_inner`](Self::into_inner). Dropping the cache writes the block back on
/// a best-effort basis, logging a failure.
#[derive(Debug)]
pub struct Cache<S: SeekableStream> {
	base: Option<Converter<S>>,
	block: Block,
	pos: u64,
	atime: Option<SystemTime>,
	mtime: Option<SystemTime>,
}

impl<S: SeekableStream> Cache<S> {
	/// Creates a cache with the default options, starting at the source's current
	/// position.
	pub fn new(source: S) -> Self {
		Self::create(source, CacheOptions::new().block_size())
	}

	/// Creates a cache with custom `options`, starting at the source's current
	/// position.
	///
	/// # Errors
	///
	/// Returns an "invalid argument" error if the block size is zero.
	pub fn with_options(source: S, options: CacheOptions) -> Result<Self> {
		match options.block_size() {
			0 => Err(Error::invalid_argument(Other("cache"), "zero block size")),
			size => Ok(Self::create(source, size))
		}
	}

	fn create(source: S, block_size: usize) -> Self {
		let pos = source.tell().unwrap_or_default();
		let atime = source.atime();
		let mtime = source.mtime();
		Self {
			base: Some(source.into()),
			block: Block::new(block_size),
			pos,
			atime,
			mtime,
		}
	}

	/// Returns the block size.
	pub fn block_size(&self) -> usize { self.block.data.len() }

	/// Returns `true` if the resident block has modifications not yet written
	/// back.
	pub fn is_dirty(&self) -> bool { self.block.status == Status::Dirty }

	/// Returns a reference to the source. Its position and contents may lag behind
	/// the cache until it's flushed.
	pub fn get_ref(&self) -> &S { self.base().get_ref() }

	/// Writes the block back, moves the source to the cache's position, then
	/// returns it.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if the block couldn't be written back. The
	/// source is dropped along with it.
	pub fn into_inner(mut self) -> Result<S> {
		let flushed = self.flush_block();
		let pos = self.pos;
		let mut base = self.take_base();
		base.seek(SeekOffset::FromStart(pos));
		if flushed {
			Ok(base.into_inner())
		} else {
			tracing::error!(start = self.block.start, "cache block was lost while unwrapping");
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

	fn parts(&mut self) -> (&mut Converter<S>, &mut Block) {
		let Self { base, block, .. } = self;
		let base = unsafe {
			// Safety: see base.
			base.as_mut().unwrap_unchecked()
		};
		(base, block)
	}

	fn set_state(&mut self, state: State) {
		self.base_mut().set_state(state)
	}

	/// Writes the valid part of the block to the source.
	fn write_block(&mut self) -> bool {
		let (base, block) = self.parts();
		if base.seek(SeekOffset::FromStart(block.start)).is_none() {
			return false
		}

		let data = block.valid();
		if base.write_fully(data) < data.len() {
			if base.ok() {
				base.set_state(State::Fail);
			}
			return false
		}
		tracing::debug!(start = block.start, len = data.len(), "wrote cache block");
		base.ok()
	}

	/// Writes the block back if it's dirty, keeping it resident. Returns `false`
	/// if writing failed, leaving the block dirty.
	fn flush_block(&mut self) -> bool {
		if self.block.status == Status::Dirty {
			if self.block.start < self.block.end && !self.write_block() {
				return false
			}
			self.block.status = Status::Loaded;
		}
		self.set_state(State::Ok);
		true
	}

	/// Writes the block back if it's dirty, then drops it.
	fn invalidate_block(&mut self) -> bool {
		if !self.flush_block() {
			return false
		}
		self.block.status = Status::Empty;
		true
	}

	/// Loads the block containing `pos`. The block must not be dirty.
	fn load_block(&mut self, pos: u64) -> bool {
		debug_assert_ne!(self.block.status, Status::Dirty);
		let (base, block) = self.parts();
		let start = pos - pos % block.size();
		block.status = Status::Empty;
		if base.seek(SeekOffset::FromStart(start)).is_none() {
			return false
		}

		let count = base.read_fully(&mut block.data);
		block.data[count..].fill(0);
		block.start = start;
		block.end = start + count as u64;
		block.status = Status::Loaded;
		tracing::debug!(start, len = count, "loaded cache block");
		// Some data may have been cached regardless of a read failure.
		base.set_state(State::Ok);
		true
	}

	/// Writes the tracked access and modification times to the source. Sources
	/// without timestamps are left alone.
	fn write_times(&mut self) {
		let atime = self.atime.take();
		let mtime = self.mtime.take();
		let base = self.base_mut();
		if let Some(Err(error)) = atime.map(|time| base.set_atime(time)) {
			tracing::trace!("access time not written back: {error}");
		}
		if let Some(Err(error)) = mtime.map(|time| base.set_mtime(time)) {
			tracing::trace!("modification time not written back: {error}");
		}
	}

	/// Sets the state after a short transfer of `count` bytes; a partial transfer
	/// is still a success.
	fn finish(&mut self, count: usize, state: State) -> usize {
		self.set_state(if count > 0 { State::Ok } else { state });
		count
	}
}

fn latest(tracked: Option<SystemTime>, source: Option<SystemTime>) -> Option<SystemTime> {
	match (tracked, source) {
		(Some(tracked), Some(source)) => Some(tracked.max(source)),
		(tracked, source) => tracked.or(source)
	}
}

impl<S: SeekableStream> Stream for Cache<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		self.atime = Some(SystemTime::now());
		if buf.is_empty() {
			self.set_state(State::Ok);
			return 0
		}

		let block_size = self.block.size();
		let mut read = 0;
		loop {
			if self.block.is_resident() {
				let block = &self.block;
				if block.contains(self.pos) {
					let offset = (self.pos - block.start) as usize;
					let available = (block.end - self.pos) as usize;
					let remaining = buf.len() - read;
					if remaining <= available {
						buf[read..].copy_from_slice(&block.data[offset..offset + remaining]);
						self.pos += remaining as u64;
						self.set_state(State::Ok);
						return buf.len()
					}

					buf[read..read + available].copy_from_slice(&block.data[offset..offset + available]);
					read += available;
					self.pos += available as u64;
				}

				if !self.flush_block() {
					return self.finish(read, State::Fail)
				}
			}

			let remaining = buf.len() - read;
			let end = self.pos + remaining as u64;
			if self.pos / block_size < end / block_size {
				// The read spans blocks; bypass the cache up to the last one.
				let pos = self.pos;
				let base = self.base_mut();
				if base.seek(SeekOffset::FromStart(pos)).is_none() {
					return self.finish(read, State::Fail)
				}

				let direct = remaining - (end % block_size) as usize;
				let count = base.read_fully(&mut buf[read..read + direct]);
				let state = base.state();
				self.pos += count as u64;
				read += count;
				if read == buf.len() {
					self.set_state(State::Ok);
					return read
				}
				if !state.is_ok() {
					return self.finish(read, state)
				}
			}

			if !self.load_block(self.pos) {
				return self.finish(read, State::Fail)
			}
			if self.block.end <= self.pos {
				return self.finish(read, State::Eof)
			}
		}
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		let now = SystemTime::now();
		self.atime = Some(now);
		self.mtime = Some(now);
		if buf.is_empty() {
			self.set_state(State::Ok);
			return 0
		}

		let block_size = self.block.size();
		let mut written = 0;
		loop {
			if self.block.is_resident() {
				let block = &mut self.block;
				let block_end = block.start + block_size;
				if (block.start..block_end).contains(&self.pos) {
					let offset = (self.pos - block.start) as usize;
					let available = (block_end - self.pos) as usize;
					let remaining = buf.len() - written;
					block.status = Status::Dirty;
					if remaining <= available {
						block.data[offset..offset + remaining].copy_from_slice(&buf[written..]);
						self.pos += remaining as u64;
						block.end = block.end.max(self.pos);
						self.set_state(State::Ok);
						return buf.len()
					}

					block.data[offset..].copy_from_slice(&buf[written..written + available]);
					written += available;
					self.pos += available as u64;
					block.end = block_end;
				}

				if !self.flush_block() {
					return written
				}
			}

			let remaining = buf.len() - written;
			let end = self.pos + remaining as u64;
			if self.pos / block_size < end / block_size {
				// The write spans blocks; bypass the cache up to the last one.
				let pos = self.pos;
				let direct = remaining - (end % block_size) as usize;
				// The block was written back above, but would go stale.
				if self.block.overlaps(pos, pos + direct as u64) {
					self.block.status = Status::Empty;
				}

				let base = self.base_mut();
				if base.seek(SeekOffset::FromStart(pos)).is_none() {
					return written
				}

				let count = base.write_fully(&buf[written..written + direct]);
				let ok = base.ok();
				self.pos += count as u64;
				written += count;
				if written == buf.len() || !ok {
					return written
				}
			}

			if !self.load_block(self.pos) {
				return written
			}
		}
	}

	/// Writes the block back along with the tracked access and modification
	/// times, then flushes the source.
	fn flush(&mut self) -> Result {
		if !self.flush_block() {
			return Err(Error::state(Flush, State::Fail))
		}
		self.write_times();
		self.base_mut().flush()
	}

	/// Writes the block back and drops it, writes back the tracked times, then
	/// closes the source.
	///
	/// # Errors
	///
	/// Returns a "data loss" error if the block couldn't be written back, after
	/// closing the source regardless.
	fn close(&mut self) -> Result {
		let invalidated = self.invalidate_block();
		if !invalidated {
			tracing::warn!(start = self.block.start, "cache block was lost while closing");
			self.block.status = Status::Empty;
		}

		self.write_times();
		let closed = self.base_mut().close();
		if !invalidated {
			self.set_state(State::Fail);
			return Err(Error::data_loss(Close))
		}
		closed
	}

	fn skip(&mut self, amount: u64) {
		self.seek(SeekOffset::Forward(amount));
	}

	fn state(&self) -> State { self.base().state() }
}

impl<S: SeekableStream> SeekableStream for Cache<S> {
	/// Moves the logical position without touching the source.
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		let size = if offset.is_from_end() { self.size() } else { Some(0) };
		match size.and_then(|size| offset.to_pos(self.pos, size)) {
			Some(pos) => {
				self.pos = pos;
				self.set_state(State::Ok);
				Some(pos)
			}
			None => {
				self.set_state(State::Fail);
				None
			}
		}
	}

	fn tell(&self) -> Option<u64> { Some(self.pos) }

	fn size(&mut self) -> Option<u64> {
		let size = self.base_mut().size();
		if self.block.is_resident() {
			size.map(|size| size.max(self.block.end))
		} else {
			size
		}
	}

	fn truncate(&mut self) -> Result {
		let now = SystemTime::now();
		self.atime = Some(now);
		self.mtime = Some(now);

		let pos = self.pos;
		let (base, block) = self.parts();
		if base.seek(SeekOffset::FromStart(pos)).is_none() {
			return Err(Error::state(Truncate, State::Fail))
		}

		if block.end <= pos {
			// The block is unaffected.
		} else if block.start <= pos {
			let len = (pos - block.start) as usize;
			block.data[len..].fill(0);
			block.end = pos;
		} else {
			block.status = Status::Empty;
		}
		base.truncate()
	}

	fn lock(&mut self, offset: u64, length: u64) -> Result {
		self.base_mut().lock(offset, length)
	}

	fn unlock(&mut self, offset: u64, length: u64) -> Result {
		self.base_mut().unlock(offset, length)
	}

	fn ctime(&self) -> Option<SystemTime> { self.base().ctime() }

	fn atime(&self) -> Option<SystemTime> {
		latest(self.atime, self.base().atime())
	}

	fn mtime(&self) -> Option<SystemTime> {
		latest(self.mtime, self.base().mtime())
	}

	fn set_ctime(&mut self, time: SystemTime) -> Result {
		self.base_mut().set_ctime(time)
	}

	fn set_atime(&mut self, time: SystemTime) -> Result {
		self.atime = Some(time);
		self.base_mut().set_atime(time)
	}

	fn set_mtime(&mut self, time: SystemTime) -> Result {
		self.mtime = Some(time);
		self.base_mut().set_mtime(time)
	}
}

impl<S: SeekableStream> Drop for Cache<S> {
	fn drop(&mut self) {
		if self.base.is_none() { return }

		if !self.flush_block() {
			tracing::error!(start = self.block.start, "cache block was lost while dropping");
		}
		self.write_times();
		let pos = self.pos;
		self.base_mut().seek(SeekOffset::FromStart(pos));
	}
}
