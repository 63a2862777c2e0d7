// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;
use crate::{Converter, Error, Limiter, Result, UNLIMITED};
use crate::limiter::clamp;
use crate::OperationKind::{Lock, Truncate, Unlock};
use crate::streams::{SeekableStream, SeekOffset, State, Stream};

/// A stream decorator restricting reads and writes to a window of its source.
///
/// Reads skip `read_offset` bytes on the source before the first transfer, then
/// return at most `read_limit` bytes. Once the read limit runs out, further
/// reads skip the requested length on the source and report
/// [`Eof`](State::Eof).
///
/// Writes work on a virtual offset: the first `write_offset` bytes written are
/// dropped, then at most `write_limit` bytes reach the source. Dropped bytes,
/// before the offset or past the limit, still count as written.
#[derive(Debug)]
pub struct Window<S: Stream> {
	limiter: Limiter<S>,
	read_offset: u64,
	write_offset: u64,
}

impl<S: Stream> Window<S> {
	/// Creates an unrestricted window. Restrict it with [`read_range`] and
	/// [`write_range`].
	///
	/// [`read_range`]: Self::read_range
	/// [`write_range`]: Self::write_range
	pub fn new(source: S) -> Self {
		Self {
			limiter: Limiter::new(source, UNLIMITED, UNLIMITED),
			read_offset: 0,
			write_offset: 0,
		}
	}

	/// Sets the read offset and limit.
	pub fn read_range(mut self, offset: u64, limit: u64) -> Self {
		self.read_offset = offset;
		self.limiter.set_read_limit(limit);
		self
	}

	/// Sets the write offset and limit.
	pub fn write_range(mut self, offset: u64, limit: u64) -> Self {
		self.write_offset = offset;
		self.limiter.set_write_limit(limit);
		self
	}

	/// Returns the number of bytes left to skip before reading.
	pub fn read_offset(&self) -> u64 { self.read_offset }

	/// Returns the number of bytes left to drop before writing.
	pub fn write_offset(&self) -> u64 { self.write_offset }

	/// Returns the number of bytes that may still be read.
	pub fn read_limit(&self) -> u64 { self.limiter.read_limit() }

	/// Returns the number of bytes that may still be written.
	pub fn write_limit(&self) -> u64 { self.limiter.write_limit() }

	pub fn get_ref(&self) -> &S { self.limiter.get_ref() }

	pub fn get_mut(&mut self) -> &mut S { self.limiter.get_mut() }

	pub fn into_inner(self) -> S { self.limiter.into_inner() }
}

impl<S: Stream> Stream for Window<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		if self.read_offset > 0 {
			let base = &mut self.limiter.base;
			base.skip(self.read_offset);
			if !base.ok() { return 0 }
			self.read_offset = 0;
		}

		if self.limiter.read_exhausted(buf.len()) {
			let base = &mut self.limiter.base;
			base.get_mut().skip(buf.len() as u64);
			base.set_state(State::Eof);
			return 0
		}
		self.limiter.read(buf)
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		if self.write_offset > 0 && buf.len() as u64 <= self.write_offset {
			self.write_offset -= buf.len() as u64;
			self.limiter.base.set_state(State::Ok);
			return buf.len()
		}

		// The offset is less than the buffer length here, so it fits.
		let dropped = self.write_offset as usize;
		self.write_offset = 0;
		let buf = &buf[dropped..];

		let limit = self.limiter.write_limit();
		if limit == UNLIMITED {
			return dropped + self.limiter.base.write(buf)
		}
		if limit == 0 {
			self.limiter.base.set_state(State::Ok);
			return dropped + buf.len()
		}

		let len = clamp(buf.len(), limit);
		let count = self.limiter.base.write(&buf[..len]);
		self.limiter.set_write_limit(limit - count as u64);
		dropped + (buf.len() - len) + count
	}

	fn flush(&mut self) -> Result { self.limiter.flush() }

	fn close(&mut self) -> Result { self.limiter.close() }

	fn state(&self) -> State { self.limiter.state() }
}

/// A seekable view of the region `[offset, offset + length)` of a seekable
/// stream. Positions are relative to the start of the region; transfers stop at
/// its end.
#[derive(Debug)]
pub struct FileWindow<S: SeekableStream> {
	base: Converter<S>,
	start: u64,
	end: u64,
}

impl<S: SeekableStream> FileWindow<S> {
	/// Creates a window over `length` bytes of `source` starting at `offset`, and
	/// seeks the source to its start.
	pub fn new(source: S, offset: u64, length: u64) -> Self {
		let mut window = Self {
			base: source.into(),
			start: offset,
			end: offset.saturating_add(length),
		};
		window.base.seek(SeekOffset::FromStart(offset));
		window
	}

	/// Returns the length of the region.
	pub fn len(&self) -> u64 { self.end - self.start }

	/// Returns `true` if the region is empty.
	pub fn is_empty(&self) -> bool { self.start == self.end }

	pub fn get_ref(&self) -> &S { self.base.get_ref() }

	pub fn get_mut(&mut self) -> &mut S { self.base.get_mut() }

	pub fn into_inner(self) -> S { self.base.into_inner() }

	/// Returns the number of bytes between the source position and the end of the
	/// region, or `None` if the position is outside it.
	fn available(&self) -> Option<u64> {
		let pos = self.base.tell()?;
		(self.start..self.end).contains(&pos).then(|| self.end - pos)
	}

	/// Clamps `length` bytes at relative `offset` to the region, returning the
	/// absolute offset and length.
	fn clamp_range(&self, offset: u64, length: u64) -> Option<(u64, u64)> {
		(offset < self.len()).then(|| (self.start + offset, length.min(self.len() - offset)))
	}
}

impl<S: SeekableStream> Stream for FileWindow<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		match self.available() {
			Some(available) => {
				let len = clamp(buf.len(), available);
				self.base.read(&mut buf[..len])
			}
			None => {
				self.base.set_state(if buf.is_empty() { State::Ok } else { State::Eof });
				0
			}
		}
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		match self.available() {
			Some(available) => {
				let len = clamp(buf.len(), available);
				self.base.write(&buf[..len])
			}
			None => {
				self.base.set_state(State::Fail);
				0
			}
		}
	}

	fn flush(&mut self) -> Result { self.base.flush() }

	fn close(&mut self) -> Result { self.base.close() }

	fn skip(&mut self, amount: u64) {
		self.seek(SeekOffset::Forward(amount));
	}

	fn state(&self) -> State { self.base.state() }
}

impl<S: SeekableStream> SeekableStream for FileWindow<S> {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		let current = self.tell().unwrap_or_default();
		let target = offset.to_pos(current, self.len())
						   .and_then(|pos| self.start.checked_add(pos));
		let Some(target) = target else {
			self.base.set_state(State::Fail);
			return None
		};
		let pos = self.base.seek(SeekOffset::FromStart(target))?;
		Some(pos - self.start)
	}

	fn tell(&self) -> Option<u64> {
		let pos = self.base.tell()?;
		(self.start..=self.end).contains(&pos).then(|| pos - self.start)
	}

	fn size(&mut self) -> Option<u64> { Some(self.len()) }

	/// Windows have a fixed size; truncating always fails.
	fn truncate(&mut self) -> Result {
		self.base.set_state(State::Fail);
		Err(Error::unsupported(Truncate))
	}

	fn lock(&mut self, offset: u64, length: u64) -> Result {
		let Some((offset, length)) = self.clamp_range(offset, length) else {
			self.base.set_state(State::Fail);
			return Err(Error::invalid_argument(Lock, "offset outside the window"))
		};
		self.base.lock(offset, length)
	}

	fn unlock(&mut self, offset: u64, length: u64) -> Result {
		let Some((offset, length)) = self.clamp_range(offset, length) else {
			self.base.set_state(State::Fail);
			return Err(Error::invalid_argument(Unlock, "offset outside the window"))
		};
		self.base.unlock(offset, length)
	}

	fn ctime(&self) -> Option<SystemTime> { self.base.ctime() }
	fn atime(&self) -> Option<SystemTime> { self.base.atime() }
	fn mtime(&self) -> Option<SystemTime> { self.base.mtime() }
	fn set_ctime(&mut self, time: SystemTime) -> Result { self.base.set_ctime(time) }
	fn set_atime(&mut self, time: SystemTime) -> Result { self.base.set_atime(time) }
	fn set_mtime(&mut self, time: SystemTime) -> Result { self.base.set_mtime(time) }
}
