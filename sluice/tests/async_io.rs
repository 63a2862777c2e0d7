// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use sluice::{AsyncReader, AsyncWriter, Buffer, Result, State, Stream};
use sluice::streams::{MemoryFile, SeekableExt, SeekableStream, StreamExt};
use common::{Broken, Counted};

mod common;

#[test]
fn integers_round_trip() -> Result {
	let mut writer = AsyncWriter::<_, 70>::spawn(MemoryFile::default())?;
	for i in 0..1000u32 {
		writer.write_data(i);
	}
	writer.flush()?;
	let mut file = writer.into_inner()?;
	assert_eq!(file.size(), Some(4000));
	assert!(file.reset());

	let mut reader = AsyncReader::<_, 50>::spawn(file)?;
	for i in 0..1000u32 {
		assert_eq!(reader.read_data::<u32>(), Some(i));
	}
	assert_eq!(reader.read_byte(), None);
	assert_eq!(reader.state(), State::Eof);
	Ok(())
}

#[test]
fn buffered_reader() -> Result {
	let data = common::pattern(10_000);
	let (source, calls) = Counted::new(MemoryFile::from_vec(data.clone()));
	let reader = AsyncReader::<_, 256>::spawn(source)?;
	let mut buffer = Buffer::new(reader);
	assert_eq!(buffer.read_remainder(20_000), data);
	assert!(calls.reads() > 1);
	Ok(())
}

#[test]
fn writer_over_broken_source() -> Result {
	let mut writer = AsyncWriter::new(Broken)?;
	writer.write(b"lost");
	assert!(writer.flush().is_err());
	assert_eq!(writer.state(), State::Fail);
	assert!(writer.into_inner().is_err());
	Ok(())
}

#[test]
fn reader_over_broken_source() -> Result {
	let mut reader = AsyncReader::new(Broken)?;
	let mut buf = [0; 8];
	assert_eq!(reader.read(&mut buf), 0);
	assert_eq!(reader.state(), State::Fail);
	Ok(())
}
