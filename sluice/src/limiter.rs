// SPDX-License-Identifier: Apache-2.0

use crate::{Converter, Result};
use crate::streams::{State, Stream};

/// A limit meaning "no limit" for [`Limiter`] and [`Window`](crate::Window).
pub const UNLIMITED: u64 = u64::MAX;

/// Clamps a request of `len` bytes to a byte budget.
pub(crate) fn clamp(len: usize, limit: u64) -> usize {
	usize::try_from(limit).map_or(len, |limit| len.min(limit))
}

/// A stream decorator limiting the number of bytes that may be read from or
/// written to its source.
///
/// Each transfer is clamped to the remaining budget, which shrinks by the number
/// of bytes actually transferred. Once a budget runs out, reads report
/// [`Eof`](State::Eof) and writes [`Fail`](State::Fail) without reaching the
/// source. A limit of [`UNLIMITED`] disables the budget.
#[derive(Debug)]
pub struct Limiter<S: Stream> {
	pub(crate) base: Converter<S>,
	read_limit: u64,
	write_limit: u64,
}

impl<S: Stream> Limiter<S> {
	pub fn new(source: S, read_limit: u64, write_limit: u64) -> Self {
		Self {
			base: source.into(),
			read_limit,
			write_limit,
		}
	}

	/// Returns the number of bytes that may still be read.
	#[inline]
	pub fn read_limit(&self) -> u64 { self.read_limit }

	/// Returns the number of bytes that may still be written.
	#[inline]
	pub fn write_limit(&self) -> u64 { self.write_limit }

	#[inline]
	pub fn set_read_limit(&mut self, value: u64) {
		self.read_limit = value;
	}

	#[inline]
	pub fn set_write_limit(&mut self, value: u64) {
		self.write_limit = value;
	}

	pub fn get_ref(&self) -> &S { self.base.get_ref() }

	pub fn get_mut(&mut self) -> &mut S { self.base.get_mut() }

	pub fn into_inner(self) -> S { self.base.into_inner() }

	/// Returns `true` if a nonzero request of `len` bytes hits an exhausted read
	/// budget.
	pub(crate) fn read_exhausted(&self, len: usize) -> bool {
		len > 0 && self.read_limit == 0
	}
}

impl<S: Stream> Stream for Limiter<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		if self.read_limit == UNLIMITED {
			return self.base.read(buf)
		}
		if self.read_exhausted(buf.len()) {
			self.base.set_state(State::Eof);
			return 0
		}

		let len = clamp(buf.len(), self.read_limit);
		let count = self.base.read(&mut buf[..len]);
		self.read_limit -= count as u64;
		count
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		if self.write_limit == UNLIMITED {
			return self.base.write(buf)
		}
		if !buf.is_empty() && self.write_limit == 0 {
			self.base.set_state(State::Fail);
			return 0
		}

		let len = clamp(buf.len(), self.write_limit);
		let count = self.base.write(&buf[..len]);
		self.write_limit -= count as u64;
		count
	}

	fn flush(&mut self) -> Result { self.base.flush() }

	fn close(&mut self) -> Result { self.base.close() }

	fn state(&self) -> State { self.base.state() }
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{Fifo, MemoryFile, StreamExt};
	use super::*;

	#[test]
	fn read_budget() {
		let mut limiter = Limiter::new(MemoryFile::from_vec(b"0123456789".to_vec()), 5, UNLIMITED);
		let mut buf = [0; 3];
		assert_eq!(limiter.read(&mut buf), 3);
		assert_eq!(limiter.read(&mut buf), 2);
		assert_eq!(&buf[..2], b"34");
		assert_eq!(limiter.read(&mut buf), 0);
		assert_eq!(limiter.state(), State::Eof);
		assert_eq!(limiter.read_limit(), 0);
		// The source is left where the budget ran out.
		assert_eq!(limiter.into_inner().read_remainder(16), b"56789");
	}

	#[test]
	fn write_budget() {
		let mut limiter = Limiter::new(Fifo::default(), UNLIMITED, 4);
		assert_eq!(limiter.write(b"abcdef"), 4);
		assert!(limiter.ok());
		assert_eq!(limiter.write(b"gh"), 0);
		assert_eq!(limiter.state(), State::Fail);
		assert_eq!(limiter.write(&[]), 0);
		assert!(limiter.ok());
		assert_eq!(limiter.get_mut().read_remainder(16), b"abcd");
	}
}
