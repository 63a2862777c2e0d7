// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::SystemTime;
use parking_lot::{Mutex, MutexGuard};
use crate::Result;
use super::{SeekableStream, SeekOffset, State, Stream};

/// A cloneable handle to a stream shared between owners or threads. Each call
/// locks the stream for its duration; clones refer to the same stream, including
/// its position and state.
#[derive(Debug, Default)]
pub struct Shared<S: ?Sized>(Arc<Mutex<S>>);

impl<S: ?Sized> Clone for Shared<S> {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

impl<S> Shared<S> {
	pub fn new(stream: S) -> Self {
		Self(Arc::new(Mutex::new(stream)))
	}

	/// Returns the inner stream if this is the only handle to it.
	pub fn try_unwrap(self) -> std::result::Result<S, Self> {
		Arc::try_unwrap(self.0)
			.map(Mutex::into_inner)
			.map_err(Self)
	}
}

impl<S: ?Sized> Shared<S> {
	/// Locks the stream, blocking until it's available.
	pub fn acquire(&self) -> MutexGuard<'_, S> {
		self.0.lock()
	}

	/// Returns `true` if both handles refer to the same stream.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl<S: Stream + ?Sized> Stream for Shared<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize { self.acquire().read(buf) }
	fn write(&mut self, buf: &[u8]) -> usize { self.acquire().write(buf) }
	fn flush(&mut self) -> Result { self.acquire().flush() }
	fn close(&mut self) -> Result { self.acquire().close() }
	fn skip(&mut self, amount: u64) { self.acquire().skip(amount) }
	fn state(&self) -> State { self.acquire().state() }
}

impl<S: SeekableStream + ?Sized> SeekableStream for Shared<S> {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> { self.acquire().seek(offset) }
	fn tell(&self) -> Option<u64> { self.acquire().tell() }
	fn size(&mut self) -> Option<u64> { self.acquire().size() }
	fn truncate(&mut self) -> Result { self.acquire().truncate() }
	fn lock(&mut self, offset: u64, length: u64) -> Result { self.acquire().lock(offset, length) }
	fn unlock(&mut self, offset: u64, length: u64) -> Result { self.acquire().unlock(offset, length) }
	fn ctime(&self) -> Option<SystemTime> { self.acquire().ctime() }
	fn atime(&self) -> Option<SystemTime> { self.acquire().atime() }
	fn mtime(&self) -> Option<SystemTime> { self.acquire().mtime() }
	fn set_ctime(&mut self, time: SystemTime) -> Result { self.acquire().set_ctime(time) }
	fn set_atime(&mut self, time: SystemTime) -> Result { self.acquire().set_atime(time) }
	fn set_mtime(&mut self, time: SystemTime) -> Result { self.acquire().set_mtime(time) }
}

#[cfg(test)]
mod tests {
	use std::thread;
	use crate::streams::{MemoryFile, SeekableExt};
	use super::*;

	#[test]
	fn clones_share_stream() {
		let file = Shared::new(MemoryFile::default());
		let mut writer = file.clone();
		thread::spawn(move || {
			writer.write(b"shared");
		}).join().unwrap();

		assert_eq!(file.acquire().as_slice(), b"shared");
		let mut reader = file.clone();
		assert!(reader.reset());
		drop(reader);
		assert_eq!(file.try_unwrap().unwrap().into_vec(), b"shared");
	}
}
