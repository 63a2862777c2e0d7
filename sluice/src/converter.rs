// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;
use crate::Result;
use crate::streams::{SeekableStream, SeekOffset, State, Stream};

/// A decorator forwarding every operation to its source unchanged, mirroring the
/// source's state after each call. Other decorators embed one and override only
/// what they change.
#[derive(Debug)]
pub struct Converter<S: Stream> {
	source: S,
	state: State,
}

impl<S: Stream> From<S> for Converter<S> {
	fn from(source: S) -> Self { Self::new(source) }
}

impl<S: Stream> Converter<S> {
	pub fn new(source: S) -> Self {
		let state = source.state();
		Self { source, state }
	}

	/// Returns a reference to the source.
	pub fn get_ref(&self) -> &S { &self.source }

	/// Returns a mutable reference to the source. Operating on it directly does
	/// not update this stream's state.
	pub fn get_mut(&mut self) -> &mut S { &mut self.source }

	/// Returns the source.
	pub fn into_inner(self) -> S { self.source }

	pub(crate) fn set_state(&mut self, state: State) {
		self.state = state;
	}

	/// Copies the source's state, returning it.
	pub(crate) fn sync_state(&mut self) -> State {
		self.state = self.source.state();
		self.state
	}
}

impl<S: Stream> Stream for Converter<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let count = self.source.read(buf);
		self.sync_state();
		count
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		let count = self.source.write(buf);
		self.sync_state();
		count
	}

	fn flush(&mut self) -> Result {
		let result = self.source.flush();
		self.sync_state();
		result
	}

	fn close(&mut self) -> Result {
		let result = self.source.close();
		self.sync_state();
		result
	}

	fn skip(&mut self, amount: u64) {
		self.source.skip(amount);
		self.sync_state();
	}

	fn state(&self) -> State { self.state }
}

impl<S: SeekableStream> SeekableStream for Converter<S> {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		let pos = self.source.seek(offset);
		self.sync_state();
		pos
	}

	fn tell(&self) -> Option<u64> { self.source.tell() }

	fn size(&mut self) -> Option<u64> { self.source.size() }

	fn truncate(&mut self) -> Result {
		let result = self.source.truncate();
		self.sync_state();
		result
	}

	fn lock(&mut self, offset: u64, length: u64) -> Result {
		let result = self.source.lock(offset, length);
		self.sync_state();
		result
	}

	fn unlock(&mut self, offset: u64, length: u64) -> Result {
		let result = self.source.unlock(offset, length);
		self.sync_state();
		result
	}

	fn ctime(&self) -> Option<SystemTime> { self.source.ctime() }
	fn atime(&self) -> Option<SystemTime> { self.source.atime() }
	fn mtime(&self) -> Option<SystemTime> { self.source.mtime() }
	fn set_ctime(&mut self, time: SystemTime) -> Result { self.source.set_ctime(time) }
	fn set_atime(&mut self, time: SystemTime) -> Result { self.source.set_atime(time) }
	fn set_mtime(&mut self, time: SystemTime) -> Result { self.source.set_mtime(time) }
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{MemoryFile, SeekableExt, StreamExt};
	use super::*;

	#[test]
	fn mirrors_source_state() {
		let mut converter = Converter::new(MemoryFile::from_vec(b"abc".to_vec()));
		assert_eq!(converter.read_remainder(8), b"abc");
		assert_eq!(converter.state(), State::Eof);
		assert_eq!(converter.seek_back(5), None);
		assert_eq!(converter.state(), State::Fail);
		assert!(converter.reset());
		assert_eq!(converter.state(), State::Ok);
	}

	#[test]
	fn borrowed_source() {
		let mut file = MemoryFile::default();
		{
			let mut converter = Converter::new(&mut file);
			assert_eq!(converter.write(b"xyz"), 3);
			assert_eq!(converter.tell(), Some(3));
		}
		assert_eq!(file.into_vec(), b"xyz");
	}
}
