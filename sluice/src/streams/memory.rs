// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;
use crate::{Error, Result};
use crate::OperationKind::Truncate;
use super::{SeekableStream, SeekOffset, State, Stream};

/// A growable, seekable stream held entirely in memory.
#[derive(Clone, Debug)]
pub struct MemoryFile {
	data: Vec<u8>,
	pos: u64,
	state: State,
	ctime: SystemTime,
	atime: SystemTime,
	mtime: SystemTime,
}

impl Default for MemoryFile {
	fn default() -> Self { Self::from_vec(Vec::new()) }
}

impl MemoryFile {
	/// Creates an empty file with `capacity` bytes reserved.
	pub fn with_capacity(capacity: usize) -> Self {
		Self::from_vec(Vec::with_capacity(capacity))
	}

	/// Creates a file containing `data`, positioned at its start.
	pub fn from_vec(data: Vec<u8>) -> Self {
		let now = SystemTime::now();
		Self {
			data,
			pos: 0,
			state: State::Ok,
			ctime: now,
			atime: now,
			mtime: now,
		}
	}

	/// Returns the file contents.
	pub fn as_slice(&self) -> &[u8] { &self.data }

	/// Consumes the file, returning its contents.
	pub fn into_vec(self) -> Vec<u8> { self.data }

	fn touch(&mut self, modified: bool) {
		let now = SystemTime::now();
		self.atime = now;
		if modified {
			self.mtime = now;
		}
	}

	/// Returns the position as an index into the data, or `None` if it doesn't
	/// fit into memory.
	fn index(&self) -> Option<usize> {
		self.pos.try_into().ok()
	}
}

impl Stream for MemoryFile {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		self.touch(false);
		let start = self.index().unwrap_or(usize::MAX).min(self.data.len());
		let available = &self.data[start..];
		if buf.len() <= available.len() {
			buf.copy_from_slice(&available[..buf.len()]);
			self.pos += buf.len() as u64;
			self.state = State::Ok;
			return buf.len()
		}
		if available.is_empty() {
			self.state = State::Eof;
			return 0
		}

		let count = available.len();
		buf[..count].copy_from_slice(available);
		self.pos += count as u64;
		self.state = State::Ok;
		count
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		self.touch(true);
		let Some(start) = self.index() else {
			self.state = State::Fail;
			return 0
		};
		let Some(end) = start.checked_add(buf.len()) else {
			self.state = State::Fail;
			return 0
		};

		if end > self.data.len() {
			// Writing past the end fills the gap with zeros.
			self.data.resize(end, 0);
		}
		self.data[start..end].copy_from_slice(buf);
		self.pos = end as u64;
		self.state = State::Ok;
		buf.len()
	}

	fn flush(&mut self) -> Result {
		self.state = State::Ok;
		Ok(())
	}

	/// Empties the file and resets its position.
	fn close(&mut self) -> Result {
		self.data = Vec::new();
		self.pos = 0;
		self.state = State::Ok;
		Ok(())
	}

	fn skip(&mut self, amount: u64) {
		self.seek(SeekOffset::Forward(amount));
	}

	fn state(&self) -> State { self.state }
}

impl SeekableStream for MemoryFile {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		match offset.to_pos(self.pos, self.data.len() as u64) {
			Some(pos) if usize::try_from(pos).is_ok() => {
				self.pos = pos;
				self.state = State::Ok;
				Some(pos)
			}
			_ => {
				self.state = State::Fail;
				None
			}
		}
	}

	fn tell(&self) -> Option<u64> { Some(self.pos) }

	fn size(&mut self) -> Option<u64> { Some(self.data.len() as u64) }

	fn truncate(&mut self) -> Result {
		self.touch(true);
		let Some(pos) = self.index() else {
			self.state = State::Fail;
			return Err(Error::state(Truncate, self.state))
		};
		self.data.truncate(pos);
		self.data.shrink_to_fit();
		self.state = State::Ok;
		Ok(())
	}

	fn ctime(&self) -> Option<SystemTime> { Some(self.ctime) }
	fn atime(&self) -> Option<SystemTime> { Some(self.atime) }
	fn mtime(&self) -> Option<SystemTime> { Some(self.mtime) }

	fn set_ctime(&mut self, time: SystemTime) -> Result {
		self.ctime = time;
		Ok(())
	}

	fn set_atime(&mut self, time: SystemTime) -> Result {
		self.atime = time;
		Ok(())
	}

	fn set_mtime(&mut self, time: SystemTime) -> Result {
		self.mtime = time;
		Ok(())
	}
}
