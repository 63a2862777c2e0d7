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

mod ext;
mod fifo;
mod file;
mod memory;
mod seeking;
mod shared;
mod std_io;

use std::time::SystemTime;
use amplify_derive::Display;
use crate::{DEFAULT_BLOCK_SIZE, Error, Result};
use crate::OperationKind::{Lock, SetTime, Unlock};

pub use ext::*;
pub use fifo::*;
pub use file::*;
pub use memory::*;
pub use seeking::*;
pub use shared::*;
pub use std_io::*;

/// The state a stream is left in by its last operation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Display)]
pub enum State {
	/// The last operation succeeded.
	#[default]
	#[display("ok")]
	Ok,
	/// The last read hit a clean end of data.
	#[display("end-of-stream")]
	Eof,
	/// The last operation failed. This persists until the caller takes some
	/// corrective action, such as seeking or reopening the stream.
	#[display("failed")]
	Fail,
}

impl State {
	/// Returns `true` if the state is [`Ok`](Self::Ok).
	#[inline]
	pub const fn is_ok(self) -> bool {
		matches!(self, Self::Ok)
	}

	/// Returns `true` if the state is [`Eof`](Self::Eof).
	#[inline]
	pub const fn is_eof(self) -> bool {
		matches!(self, Self::Eof)
	}

	/// Returns `true` if the state is [`Fail`](Self::Fail).
	#[inline]
	pub const fn is_fail(self) -> bool {
		matches!(self, Self::Fail)
	}
}

/// A byte stream.
///
/// Reads and writes are partial: they return the number of bytes actually
/// transferred, which may be less than requested. After a short transfer the
/// [`state`](Self::state) tells why; [`Eof`](State::Eof) for a clean end of data
/// on read, [`Fail`](State::Fail) for anything else. A zero-length write is a
/// valid operation distinct from no call at all, some backends attach meaning
/// to it.
pub trait Stream {
	/// Reads at most `buf.len()` bytes into `buf`, returning the number of bytes
	/// read. A read of zero bytes into an empty buffer leaves the state `Ok`.
	fn read(&mut self, buf: &mut [u8]) -> usize;

	/// Writes `buf`, returning the number of bytes written.
	fn write(&mut self, buf: &[u8]) -> usize;

	/// Persists any volatile data to its final target.
	fn flush(&mut self) -> Result;

	/// Closes the stream.
	fn close(&mut self) -> Result;

	/// Skips `amount` bytes. The default reads and discards them in blocks.
	fn skip(&mut self, amount: u64) {
		skip_by_reading(self, amount)
	}

	/// Returns the state left by the last operation.
	fn state(&self) -> State;

	/// Returns `true` if the last operation succeeded.
	#[inline]
	fn ok(&self) -> bool { self.state().is_ok() }
}

/// Skips `amount` bytes on `stream` by reading them into a scratch block.
pub(crate) fn skip_by_reading<S: Stream + ?Sized>(stream: &mut S, mut amount: u64) {
	if amount == 0 { return }

	let mut block = vec![0; amount.min(DEFAULT_BLOCK_SIZE as u64) as usize];
	while amount > 0 {
		let len = amount.min(block.len() as u64) as usize;
		let read = stream.read(&mut block[..len]);
		amount -= read as u64;
		if read == 0 || !stream.ok() {
			break
		}
	}
}

/// A stream with an absolute position, size, and metadata.
///
/// Seekable streams should implement [`Stream::skip`] as a relative seek.
pub trait SeekableStream: Stream {
	/// Seeks to `offset`, returning the new absolute position, or `None` if the
	/// seek failed.
	fn seek(&mut self, offset: SeekOffset) -> Option<u64>;

	/// Returns the absolute position, or `None` if it cannot be determined. This
	/// does not change the stream state.
	fn tell(&self) -> Option<u64>;

	/// Returns the stream size, or `None` if it cannot be determined.
	fn size(&mut self) -> Option<u64>;

	/// Truncates the stream at the current position.
	fn truncate(&mut self) -> Result;

	/// Locks `length` bytes at `offset` for exclusive access.
	fn lock(&mut self, offset: u64, length: u64) -> Result {
		let _ = (offset, length);
		Err(Error::unsupported(Lock))
	}

	/// Unlocks `length` bytes at `offset`.
	fn unlock(&mut self, offset: u64, length: u64) -> Result {
		let _ = (offset, length);
		Err(Error::unsupported(Unlock))
	}

	/// Returns the creation time, if known.
	fn ctime(&self) -> Option<SystemTime> { None }

	/// Returns the last access time, if known.
	fn atime(&self) -> Option<SystemTime> { None }

	/// Returns the last modification time, if known.
	fn mtime(&self) -> Option<SystemTime> { None }

	fn set_ctime(&mut self, time: SystemTime) -> Result {
		let _ = time;
		Err(Error::unsupported(SetTime))
	}

	fn set_atime(&mut self, time: SystemTime) -> Result {
		let _ = time;
		Err(Error::unsupported(SetTime))
	}

	fn set_mtime(&mut self, time: SystemTime) -> Result {
		let _ = time;
		Err(Error::unsupported(SetTime))
	}
}

macro_rules! forward_stream {
	($($ty:ty),+) => {
		$(
		impl<S: Stream + ?Sized> Stream for $ty {
			#[inline]
			fn read(&mut self, buf: &mut [u8]) -> usize { (**self).read(buf) }
			#[inline]
			fn write(&mut self, buf: &[u8]) -> usize { (**self).write(buf) }
			#[inline]
			fn flush(&mut self) -> Result { (**self).flush() }
			#[inline]
			fn close(&mut self) -> Result { (**self).close() }
			#[inline]
			fn skip(&mut self, amount: u64) { (**self).skip(amount) }
			#[inline]
			fn state(&self) -> State { (**self).state() }
		}

		impl<S: SeekableStream + ?Sized> SeekableStream for $ty {
			#[inline]
			fn seek(&mut self, offset: SeekOffset) -> Option<u64> { (**self).seek(offset) }
			#[inline]
			fn tell(&self) -> Option<u64> { (**self).tell() }
			#[inline]
			fn size(&mut self) -> Option<u64> { (**self).size() }
			#[inline]
			fn truncate(&mut self) -> Result { (**self).truncate() }
			fn lock(&mut self, offset: u64, length: u64) -> Result { (**self).lock(offset, length) }
			fn unlock(&mut self, offset: u64, length: u64) -> Result { (**self).unlock(offset, length) }
			fn ctime(&self) -> Option<SystemTime> { (**self).ctime() }
			fn atime(&self) -> Option<SystemTime> { (**self).atime() }
			fn mtime(&self) -> Option<SystemTime> { (**self).mtime() }
			fn set_ctime(&mut self, time: SystemTime) -> Result { (**self).set_ctime(time) }
			fn set_atime(&mut self, time: SystemTime) -> Result { (**self).set_atime(time) }
			fn set_mtime(&mut self, time: SystemTime) -> Result { (**self).set_mtime(time) }
		}
		)+
	};
}

forward_stream! { &mut S, Box<S> }
