// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, FileTimes, OpenOptions};
use std::io;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;
use crate::{Error, Result};
use crate::OperationKind::{Close, Flush, Open, SetTime, Truncate};
use super::{SeekableStream, SeekOffset, State, Stream};

/// A seekable [`Stream`] over a [file](File).
#[derive(Debug)]
pub struct FileStream {
	file: Option<File>,
	state: State,
}

impl From<File> for FileStream {
	fn from(file: File) -> Self {
		Self { file: Some(file), state: State::Ok }
	}
}

impl FileStream {
	/// Opens a file for reading.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		File::open(path)
			.map(Into::into)
			.map_err(|err| Error::io(Open, err))
	}

	/// Opens a file for reading and writing, creating it if needed. Existing
	/// contents are kept.
	pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
		Self::open_with(path, OpenOptions::new().read(true).write(true).create(true))
	}

	/// Opens a file with custom `options`.
	pub fn open_with<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
		options.open(path)
			   .map(Into::into)
			   .map_err(|err| Error::io(Open, err))
	}

	/// Returns the file, or `None` if the stream was closed.
	pub fn into_inner(mut self) -> Option<File> { self.file.take() }

	fn with_file<T>(&mut self, op: impl FnOnce(&mut File) -> io::Result<T>) -> Option<T> {
		let Some(file) = self.file.as_mut() else {
			self.state = State::Fail;
			return None
		};
		match op(file) {
			Ok(value) => {
				self.state = State::Ok;
				Some(value)
			}
			Err(err) => {
				tracing::debug!("file operation failed: {err}");
				self.state = State::Fail;
				None
			}
		}
	}

	fn set_times(&mut self, times: FileTimes) -> Result {
		self.with_file(|file| file.set_times(times))
			.ok_or_else(|| Error::state(SetTime, State::Fail))
	}
}

impl Stream for FileStream {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let requested = buf.len();
		let count = self.with_file(|file| loop {
			match file.read(buf) {
				Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
				result => break result
			}
		});
		match count {
			Some(0) if requested > 0 => {
				self.state = State::Eof;
				0
			}
			count => count.unwrap_or_default()
		}
	}

	/// Writes `buf`, retrying partial writes. On an error, returns the number of
	/// bytes that reached the file before it.
	fn write(&mut self, buf: &[u8]) -> usize {
		let Some(file) = self.file.as_mut() else {
			self.state = State::Fail;
			return 0
		};

		let mut written = 0;
		while written < buf.len() {
			match file.write(&buf[written..]) {
				Ok(0) => {
					tracing::debug!(written, "file accepted no more bytes");
					self.state = State::Fail;
					return written
				}
				Ok(count) => written += count,
				Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
				Err(err) => {
					tracing::debug!(written, "file write failed: {err}");
					self.state = State::Fail;
					return written
				}
			}
		}
		self.state = State::Ok;
		written
	}

	fn flush(&mut self) -> Result {
		self.with_file(|file| file.sync_data())
			.ok_or_else(|| Error::state(Flush, State::Fail))
	}

	/// Closes the file by letting it fall out of scope.
	fn close(&mut self) -> Result {
		let flushed = if self.file.is_some() { self.flush() } else { Ok(()) };
		self.file.take();
		flushed.map_err(|err| err.with_operation(Close))
	}

	fn skip(&mut self, amount: u64) {
		self.seek(SeekOffset::Forward(amount));
	}

	fn state(&self) -> State { self.state }
}

impl SeekableStream for FileStream {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		self.with_file(|file| file.seek(offset.into_seek_from()))
	}

	fn tell(&self) -> Option<u64> {
		// Seeking by zero on a shared reference is allowed for files.
		let mut file = self.file.as_ref()?;
		file.stream_position().ok()
	}

	fn size(&mut self) -> Option<u64> {
		self.with_file(|file| file.metadata()).map(|meta| meta.len())
	}

	fn truncate(&mut self) -> Result {
		self.with_file(|file| {
			let pos = file.stream_position()?;
			file.set_len(pos)
		}).ok_or_else(|| Error::state(Truncate, State::Fail))
	}

	fn ctime(&self) -> Option<SystemTime> {
		self.file.as_ref()?.metadata().ok()?.created().ok()
	}

	fn atime(&self) -> Option<SystemTime> {
		self.file.as_ref()?.metadata().ok()?.accessed().ok()
	}

	fn mtime(&self) -> Option<SystemTime> {
		self.file.as_ref()?.metadata().ok()?.modified().ok()
	}

	fn set_atime(&mut self, time: SystemTime) -> Result {
		self.set_times(FileTimes::new().set_accessed(time))
	}

	fn set_mtime(&mut self, time: SystemTime) -> Result {
		self.set_times(FileTimes::new().set_modified(time))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use tempfile::tempfile;
	use crate::streams::{SeekableExt, StreamExt};
	use super::*;

	#[test]
	fn read_write_truncate() -> Result {
		let mut file = FileStream::from(tempfile()?);
		assert_eq!(file.write(b"0123456789"), 10);
		assert_eq!(file.size(), Some(10));
		assert_eq!(file.seek_from_start(4), Some(4));
		file.truncate()?;
		assert_eq!(file.size(), Some(4));
		assert!(file.reset());
		assert_eq!(file.read_remainder(usize::MAX), b"0123");
		assert_eq!(file.state(), State::Eof);
		assert_eq!(file.tell(), Some(4));
		Ok(())
	}

	#[test]
	fn read_only_write_fails() -> Result {
		let path = tempfile::NamedTempFile::new()?.into_temp_path();
		let mut file = FileStream::open(&path)?;
		assert_eq!(file.write(b"denied"), 0);
		assert_eq!(file.state(), State::Fail);
		assert_eq!(file.size(), Some(0));
		Ok(())
	}

	#[cfg(target_os = "linux")]
	#[test]
	fn full_device_fails() -> Result {
		let mut file = FileStream::open_with("/dev/full", OpenOptions::new().write(true))?;
		assert_eq!(file.write(b"no space"), 0);
		assert_eq!(file.state(), State::Fail);
		assert_eq!(file.write(&[]), 0);
		assert!(file.ok());
		Ok(())
	}

	#[test]
	fn closed_file_fails() -> Result {
		let mut file = FileStream::from(tempfile()?);
		file.close()?;
		assert_eq!(file.write(b"x"), 0);
		assert_eq!(file.state(), State::Fail);
		Ok(())
	}
}
