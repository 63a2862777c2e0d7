// SPDX-License-Identifier: Apache-2.0

//! Convenience operations shared by every [`Stream`].

use bytemuck::Pod;
use num_traits::PrimInt;
use crate::{DEFAULT_BLOCK_SIZE, Error, ErrorKind, Result};
use crate::error::check;
use crate::OperationKind::{Read, Write};
use super::Stream;

/// A primitive integer that can be read from or written to a stream, encoded in
/// little-endian byte order.
pub trait Primitive: Pod + PrimInt { }

impl<T: Pod + PrimInt> Primitive for T { }

pub trait StreamExt: Stream {
	/// Reads until `buf` is full or the stream stops being [`Ok`](super::State::Ok),
	/// returning the number of bytes read.
	fn read_fully(&mut self, buf: &mut [u8]) -> usize {
		let mut read = 0;
		while read < buf.len() {
			let count = self.read(&mut buf[read..]);
			read += count;
			if count == 0 || !self.ok() {
				break
			}
		}
		read
	}

	/// Writes all of `buf` unless the stream fails, retrying partial writes.
	/// Returns the number of bytes written.
	fn write_fully(&mut self, buf: &[u8]) -> usize {
		let mut written = 0;
		while written < buf.len() {
			let count = self.write(&buf[written..]);
			written += count;
			if count == 0 || !self.ok() {
				break
			}
		}
		written
	}

	/// Reads one byte.
	fn read_byte(&mut self) -> Option<u8> {
		let mut byte = [0];
		(self.read_fully(&mut byte) == 1).then_some(byte[0])
	}

	/// Writes `byte` repeated `amount` times, returning the number of bytes
	/// written.
	fn write_byte(&mut self, byte: u8, amount: u64) -> u64 {
		if amount == 1 {
			return self.write(&[byte]) as u64
		}

		let block = vec![byte; amount.min(DEFAULT_BLOCK_SIZE as u64) as usize];
		let mut written = 0;
		while written < amount {
			let len = (amount - written).min(block.len() as u64) as usize;
			written += self.write_fully(&block[..len]) as u64;
			if !self.ok() {
				break
			}
		}
		written
	}

	/// Reads a little-endian primitive. Nothing is read if the stream is not
	/// [`Ok`](super::State::Ok), so reads can be chained and checked once at the
	/// end.
	fn read_data<T: Primitive>(&mut self) -> Option<T> {
		if !self.ok() { return None }

		let mut value = T::zeroed();
		let bytes = bytemuck::bytes_of_mut(&mut value);
		let len = bytes.len();
		(self.read_fully(bytes) == len).then(|| T::from_le(value))
	}

	/// Writes a little-endian primitive. Nothing is written if the stream is not
	/// [`Ok`](super::State::Ok), so writes can be chained and checked once at the
	/// end.
	fn write_data<T: Primitive>(&mut self, value: T) -> &mut Self {
		if self.ok() {
			self.write_fully(bytemuck::bytes_of(&value.to_le()));
		}
		self
	}

	/// Reads a UTF-8 string prefixed with its `u32` little-endian byte length.
	fn read_str(&mut self) -> Result<String> {
		let len = self.read_data::<u32>()
					  .ok_or_else(|| Error::state(Read, self.state()))?;
		let bytes = self.read_remainder(len as usize);
		if bytes.len() < len as usize {
			check(self.state(), Read)?;
			return Err(Error::state(Read, super::State::Eof))
		}

		simdutf8::basic::from_utf8(&bytes).map_err(|err|
			Error::new(Read, ErrorKind::Other("invalid UTF-8 string"), Some(err.into()))
		)?;
		// Safety: validated above.
		Ok(unsafe { String::from_utf8_unchecked(bytes) })
	}

	/// Writes a UTF-8 string prefixed with its `u32` little-endian byte length.
	fn write_str(&mut self, value: &str) -> Result<&mut Self> {
		let len: u32 = value.len().try_into().map_err(|_|
			Error::invalid_argument(Write, "string too long")
		)?;
		self.write_data(len);
		if self.ok() {
			self.write_fully(value.as_bytes());
		}
		check(self.state(), Write)?;
		Ok(self)
	}

	/// Reads up to the end of the line or stream, appending the bytes to `line`.
	/// The `\n` ending the line is consumed but not appended, nor is a `\r`
	/// right before it. Returns the total length of `line`.
	fn read_line(&mut self, line: &mut Vec<u8>) -> usize {
		let start = line.len();
		while let Some(byte) = self.read_byte() {
			if byte == b'\n' {
				if line.len() > start && line.last() == Some(&b'\r') {
					line.pop();
				}
				break
			}
			line.push(byte);
		}
		line.len()
	}

	/// Reads the remainder of the stream, at most `max_len` bytes.
	fn read_remainder(&mut self, max_len: usize) -> Vec<u8> {
		let mut data = Vec::new();
		while data.len() < max_len {
			let start = data.len();
			let len = (max_len - start).min(DEFAULT_BLOCK_SIZE);
			data.resize(start + len, 0);
			let read = self.read_fully(&mut data[start..]);
			data.truncate(start + read);
			if read < len {
				break
			}
		}
		data
	}

	/// Copies at most `amount` bytes from `source` into this stream, returning the
	/// number of bytes copied. Reaching the end of `source` is not an error.
	fn write_stream<S: Stream + ?Sized>(&mut self, source: &mut S, amount: u64) -> u64 {
		let mut block = vec![0; amount.min(DEFAULT_BLOCK_SIZE as u64) as usize];
		let mut copied = 0;
		while copied < amount {
			let len = (amount - copied).min(block.len() as u64) as usize;
			let read = source.read(&mut block[..len]);
			copied += self.write_fully(&block[..read]) as u64;
			if !source.ok() || !self.ok() || read == 0 {
				break
			}
		}
		copied
	}
}

impl<S: Stream + ?Sized> StreamExt for S { }

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{Fifo, MemoryFile, SeekableExt, State};
	use super::*;

	#[test]
	fn data_chain() {
		let mut file = MemoryFile::default();
		file.write_data(1u8)
			.write_data(-2i16)
			.write_data(0xDEAD_BEEFu32)
			.write_data(u64::MAX);
		assert_eq!(file.as_slice().len(), 15);
		assert_eq!(&file.as_slice()[3..7], &[0xEF, 0xBE, 0xAD, 0xDE]);

		file.reset();
		assert_eq!(file.read_data::<u8>(), Some(1));
		assert_eq!(file.read_data::<i16>(), Some(-2));
		assert_eq!(file.read_data::<u32>(), Some(0xDEAD_BEEF));
		assert_eq!(file.read_data::<u64>(), Some(u64::MAX));
		assert_eq!(file.read_data::<u8>(), None);
		assert_eq!(file.state(), State::Eof);
		// Chained reads are skipped once the stream is no longer ok.
		assert_eq!(file.read_data::<u8>(), None);
	}

	#[test]
	fn strings() -> Result {
		let mut fifo = Fifo::default();
		fifo.write_str("sluice")?.write_str("")?;
		assert_eq!(fifo.read_str()?, "sluice");
		assert_eq!(fifo.read_str()?, "");
		assert_eq!(fifo.read_str().unwrap_err().kind(), ErrorKind::Eof);
		Ok(())
	}

	#[test]
	fn invalid_string() {
		let mut fifo = Fifo::default();
		fifo.write_data(2u32);
		fifo.write(&[0xC3, 0x28]);
		assert!(fifo.read_str().is_err());
	}

	#[test]
	fn lines() {
		let mut fifo = Fifo::default();
		fifo.write(b"first\r\nsecond\nthird\rstill\n\nlast");

		let mut line = Vec::new();
		assert_eq!(fifo.read_line(&mut line), 5);
		assert_eq!(line, b"first");
		line.clear();
		fifo.read_line(&mut line);
		assert_eq!(line, b"second");
		line.clear();
		fifo.read_line(&mut line);
		assert_eq!(line, b"third\rstill");
		line.clear();
		assert_eq!(fifo.read_line(&mut line), 0);
		assert!(fifo.ok());

		line.clear();
		assert_eq!(fifo.read_line(&mut line), 4);
		assert_eq!(line, b"last");
		assert_eq!(fifo.state(), State::Eof);
	}

	#[test]
	fn line_appends() {
		let mut file = MemoryFile::from_vec(b"\ntail\r\n".to_vec());
		let mut line = b"head\r".to_vec();
		// A carriage return already in the line is kept.
		assert_eq!(file.read_line(&mut line), 5);
		assert_eq!(line, b"head\r");
		assert_eq!(file.read_line(&mut line), 9);
		assert_eq!(line, b"head\rtail");
	}

	#[test]
	fn repeated_byte() {
		let mut file = MemoryFile::default();
		assert_eq!(file.write_byte(b'x', DEFAULT_BLOCK_SIZE as u64 + 3), DEFAULT_BLOCK_SIZE as u64 + 3);
		assert!(file.as_slice().iter().all(|&b| b == b'x'));
	}

	#[test]
	fn copy_stream() {
		let mut source = MemoryFile::from_vec((0..=255).collect());
		let mut target = Fifo::default();
		assert_eq!(target.write_stream(&mut source, u64::MAX), 256);
		assert_eq!(target.read_remainder(usize::MAX), (0..=255).collect::<Vec<u8>>());
	}
}
