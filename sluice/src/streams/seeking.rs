// SPDX-License-Identifier: Apache-2.0

use std::io::SeekFrom;
use super::SeekableStream;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SeekOffset {
	/// Reset the stream to the start. Equivalent to `FromStart(0)`.
	Reset,
	/// Move forward by an offset.
	Forward(u64),
	/// Move back by an offset.
	Back(u64),
	/// Seek a position from the start of the stream.
	FromStart(u64),
	/// Seek a position from the end of the stream. A positive position will seek
	/// beyond the stream, the behavior of which is implementation-dependent.
	FromEnd(i64),
}

impl SeekOffset {
	/// Converts to a start-based position given a current `pos` and `len`.
	/// Returns `None` if the position would be negative or overflow.
	pub fn to_pos(self, pos: u64, len: u64) -> Option<u64> {
		match self {
			SeekOffset::Reset          => Some(0),
			SeekOffset::Forward  (off) => pos.checked_add(off),
			SeekOffset::Back     (off) => pos.checked_sub(off),
			SeekOffset::FromStart(pos) => Some(pos),
			SeekOffset::FromEnd  (off) => len.checked_add_signed(off)
		}
	}

	/// Returns `true` if resolving the offset requires the stream length.
	pub fn is_from_end(self) -> bool {
		matches!(self, SeekOffset::FromEnd(_))
	}

	/// Convert into [`std::io`]'s [`SeekFrom`] enum. Relative offsets beyond
	/// `i64::MAX` saturate.
	pub fn into_seek_from(self) -> SeekFrom {
		fn conv_signed(off: u64) -> i64 {
			off.try_into().unwrap_or(i64::MAX)
		}

		match self {
			SeekOffset::Reset          => SeekFrom::Start(0),
			SeekOffset::Forward  (off) => SeekFrom::Current(conv_signed(off)),
			SeekOffset::Back     (off) => SeekFrom::Current(-conv_signed(off)),
			SeekOffset::FromStart(pos) => SeekFrom::Start(pos),
			SeekOffset::FromEnd  (pos) => SeekFrom::End(pos)
		}
	}
}

impl From<SeekFrom> for SeekOffset {
	fn from(value: SeekFrom) -> Self {
		match value {
			SeekFrom::Start  (pos)       => SeekOffset::FromStart(pos),
			SeekFrom::End    (pos)       => SeekOffset::FromEnd(pos),
			SeekFrom::Current(off @ 0..) => SeekOffset::Forward(off as u64),
			SeekFrom::Current(off      ) => SeekOffset::Back(off.unsigned_abs())
		}
	}
}

impl From<SeekOffset> for SeekFrom {
	fn from(value: SeekOffset) -> Self {
		value.into_seek_from()
	}
}

/// A convenience extension for [`SeekableStream`].
pub trait SeekableExt: SeekableStream {
	/// Resets to the start of the stream. Shorthand for `seek(SeekOffset::Reset)`.
	fn reset(&mut self) -> bool {
		self.seek(SeekOffset::Reset).is_some()
	}

	/// Seeks forward `offset` bytes relative to the current position, returning
	/// the new position. Shorthand for `seek(SeekOffset::Forward(offset))`.
	fn seek_forward(&mut self, offset: u64) -> Option<u64> {
		self.seek(SeekOffset::Forward(offset))
	}

	/// Seeks back `offset` bytes relative to the current position, returning the
	/// new position. Shorthand for `seek(SeekOffset::Back(offset))`.
	fn seek_back(&mut self, offset: u64) -> Option<u64> {
		self.seek(SeekOffset::Back(offset))
	}

	/// Seeks to `offset` bytes from the start of the stream, returning the new
	/// position. Shorthand for `seek(SeekOffset::FromStart(offset))`.
	fn seek_from_start(&mut self, offset: u64) -> Option<u64> {
		self.seek(SeekOffset::FromStart(offset))
	}

	/// Seeks `offset` bytes relative to the end of the stream, returning the new
	/// position. Shorthand for `seek(SeekOffset::FromEnd(offset))`.
	fn seek_from_end(&mut self, offset: i64) -> Option<u64> {
		self.seek(SeekOffset::FromEnd(offset))
	}

	/// Returns the bytes remaining between the current position and the end.
	fn remaining(&mut self) -> Option<u64> {
		let pos = self.tell()?;
		Some(self.size()?.saturating_sub(pos))
	}
}

impl<S: SeekableStream + ?Sized> SeekableExt for S { }

#[cfg(test)]
mod tests {
	use quickcheck_macros::quickcheck;
	use super::*;

	#[test]
	fn to_pos() {
		assert_eq!(SeekOffset::Reset.to_pos(5, 10), Some(0));
		assert_eq!(SeekOffset::Forward(3).to_pos(5, 10), Some(8));
		assert_eq!(SeekOffset::Back(6).to_pos(5, 10), None);
		assert_eq!(SeekOffset::FromEnd(-4).to_pos(5, 10), Some(6));
		assert_eq!(SeekOffset::FromEnd(-11).to_pos(5, 10), None);
		assert_eq!(SeekOffset::FromEnd(2).to_pos(5, 10), Some(12));
	}

	#[quickcheck]
	fn seek_from_conversion(off: i64) -> bool {
		let from = SeekFrom::Current(off);
		off == i64::MIN || SeekFrom::from(SeekOffset::from(from)) == from
	}
}
