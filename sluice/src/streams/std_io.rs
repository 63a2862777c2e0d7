// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use crate::{Error, Result};
use crate::error::check;
use crate::OperationKind::{Close, Flush, Read as ReadOp, Seek as SeekOp, Write as WriteOp};
use super::{SeekableStream, State, Stream};

/// Maps an IO result onto a transfer count and stream state.
fn transfer(result: io::Result<usize>, requested: usize, state: &mut State) -> usize {
	match result {
		Ok(0) if requested > 0 => {
			*state = State::Eof;
			0
		}
		Ok(count) => {
			*state = State::Ok;
			count
		}
		Err(err) => {
			tracing::debug!("stream IO failed: {err}");
			*state = State::Fail;
			0
		}
	}
}

fn retry<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
	loop {
		match op() {
			Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
			result => break result
		}
	}
}

/// A [`Stream`] reading from a wrapped [`Read`]er. Writes fail.
#[derive(Debug)]
pub struct ReaderStream<R: Read> {
	reader: Option<R>,
	state: State,
}

/// A [`Stream`] writing to a wrapped [`Write`]r. Reads fail.
#[derive(Debug)]
pub struct WriterStream<W: Write> {
	writer: Option<W>,
	state: State,
}

impl<R: Read> From<R> for ReaderStream<R> {
	fn from(reader: R) -> Self {
		Self { reader: Some(reader), state: State::Ok }
	}
}

impl<W: Write> From<W> for WriterStream<W> {
	fn from(writer: W) -> Self {
		Self { writer: Some(writer), state: State::Ok }
	}
}

impl<R: Read> ReaderStream<R> {
	/// Returns the reader, or `None` if the stream was closed.
	pub fn into_inner(mut self) -> Option<R> { self.reader.take() }
}

impl<W: Write> WriterStream<W> {
	/// Returns the writer, or `None` if the stream was closed.
	pub fn into_inner(mut self) -> Option<W> { self.writer.take() }
}

impl<R: Read> Stream for ReaderStream<R> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let Some(reader) = self.reader.as_mut() else {
			self.state = State::Fail;
			return 0
		};
		transfer(retry(|| reader.read(buf)), buf.len(), &mut self.state)
	}

	fn write(&mut self, _: &[u8]) -> usize {
		self.state = State::Fail;
		0
	}

	fn flush(&mut self) -> Result {
		self.state = State::Ok;
		Ok(())
	}

	/// Closes the underlying reader by letting it fall out of scope. Subsequent
	/// reads will fail.
	fn close(&mut self) -> Result {
		self.reader.take();
		self.state = State::Ok;
		Ok(())
	}

	fn state(&self) -> State { self.state }
}

impl<W: Write> Stream for WriterStream<W> {
	fn read(&mut self, _: &mut [u8]) -> usize {
		self.state = State::Fail;
		0
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		let Some(writer) = self.writer.as_mut() else {
			self.state = State::Fail;
			return 0
		};
		match retry(|| writer.write(buf)) {
			Ok(count) => {
				// A writer accepting nothing from a nonempty buffer can't make
				// progress.
				self.state = if count == 0 && !buf.is_empty() { State::Fail } else { State::Ok };
				count
			}
			Err(err) => {
				tracing::debug!("stream write failed: {err}");
				self.state = State::Fail;
				0
			}
		}
	}

	fn flush(&mut self) -> Result {
		let Some(writer) = self.writer.as_mut() else {
			self.state = State::Fail;
			return Err(Error::state(Flush, self.state))
		};
		writer.flush().map_err(|err| {
			self.state = State::Fail;
			Error::io(Flush, err)
		})?;
		self.state = State::Ok;
		Ok(())
	}

	/// Flushes then closes the underlying writer by letting it fall out of scope.
	/// Subsequent writes will fail.
	fn close(&mut self) -> Result {
		let flushed = if self.writer.is_some() { self.flush() } else { Ok(()) };
		self.writer.take();
		flushed.map_err(|err| err.with_operation(Close))
	}

	fn state(&self) -> State { self.state }
}

/// A wrapper implementing [`Read`], [`Write`], and [`Seek`] for a [`Stream`],
/// for use with APIs expecting the standard IO traits.
#[derive(Debug)]
pub struct StreamIo<S: Stream>(S);

impl<S: Stream> StreamIo<S> {
	pub fn new(stream: S) -> Self { Self(stream) }

	pub fn get_ref(&self) -> &S { &self.0 }

	pub fn get_mut(&mut self) -> &mut S { &mut self.0 }

	pub fn into_inner(self) -> S { self.0 }
}

impl<S: Stream> Read for StreamIo<S> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let Self(stream) = self;
		let count = stream.read(buf);
		match stream.state() {
			State::Fail if count == 0 => Err(Error::state(ReadOp, State::Fail).into()),
			_ => Ok(count)
		}
	}
}

impl<S: Stream> Write for StreamIo<S> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let Self(stream) = self;
		let count = stream.write(buf);
		if count == 0 && !buf.is_empty() {
			check(stream.state(), WriteOp)?;
			return Err(io::ErrorKind::WriteZero.into())
		}
		Ok(count)
	}

	fn flush(&mut self) -> io::Result<()> {
		let Self(stream) = self;
		Ok(stream.flush()?)
	}
}

impl<S: SeekableStream> Seek for StreamIo<S> {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let Self(stream) = self;
		stream.seek(pos.into())
			  .ok_or_else(|| Error::state(SeekOp, State::Fail).into())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;
	use pretty_assertions::assert_eq;
	use crate::streams::{MemoryFile, StreamExt};
	use super::*;

	#[test]
	fn reader_stream() {
		let mut stream = ReaderStream::from(&b"abc"[..]);
		assert_eq!(stream.read_remainder(16), b"abc");
		assert_eq!(stream.state(), State::Eof);
		assert_eq!(stream.write(b"x"), 0);
		assert_eq!(stream.state(), State::Fail);
	}

	#[test]
	fn writer_stream() -> Result {
		let mut stream = WriterStream::from(Cursor::new(Vec::new()));
		assert_eq!(stream.write(b"abc"), 3);
		stream.flush()?;
		assert_eq!(stream.into_inner().unwrap().into_inner(), b"abc");
		Ok(())
	}

	#[test]
	fn std_io_adapter() -> io::Result<()> {
		let mut io = StreamIo::new(MemoryFile::default());
		io.write_all(b"hello world")?;
		io.seek(SeekFrom::Start(6))?;
		let mut text = String::new();
		io.read_to_string(&mut text)?;
		assert_eq!(text, "world");
		Ok(())
	}
}
