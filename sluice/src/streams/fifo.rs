// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use crate::Result;
use super::{State, Stream};

/// An in-memory first-in-first-out queue. Written chunks are read back in order;
/// reading an empty queue reports [`Eof`](State::Eof).
#[derive(Clone, Debug, Default)]
pub struct Fifo {
	chunks: VecDeque<Vec<u8>>,
	/// Read offset into the front chunk.
	offset: usize,
	len: usize,
	state: State,
}

impl Fifo {
	/// Returns the number of bytes pending in the queue.
	pub fn len(&self) -> usize { self.len }

	/// Returns `true` if no bytes are pending.
	pub fn is_empty(&self) -> bool { self.len == 0 }
}

impl Stream for Fifo {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let mut read = 0;
		while read < buf.len() {
			let Some(chunk) = self.chunks.front() else {
				self.state = if read > 0 || buf.is_empty() { State::Ok } else { State::Eof };
				return read
			};

			let available = &chunk[self.offset..];
			let count = available.len().min(buf.len() - read);
			buf[read..read + count].copy_from_slice(&available[..count]);
			read += count;
			self.len -= count;
			if count < available.len() {
				self.offset += count;
			} else {
				self.offset = 0;
				self.chunks.pop_front();
			}
		}
		self.state = State::Ok;
		read
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		if !buf.is_empty() {
			self.chunks.push_back(buf.to_vec());
			self.len += buf.len();
		}
		self.state = State::Ok;
		buf.len()
	}

	fn flush(&mut self) -> Result {
		self.state = State::Ok;
		Ok(())
	}

	/// Discards all pending data.
	fn close(&mut self) -> Result {
		self.chunks.clear();
		self.offset = 0;
		self.len = 0;
		self.state = State::Ok;
		Ok(())
	}

	fn state(&self) -> State { self.state }
}
