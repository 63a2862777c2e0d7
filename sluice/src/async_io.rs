// SPDX-License-Identifier: Apache-2.0

//! Read-ahead and write-behind on background threads.
//!
//! Both decorators hand their source to a worker thread, exchanging data with it
//! through a [`RingBuffer`](crate::RingBuffer). The source is kept behind a
//! [`Shared`] handle, so operations the worker doesn't perform, like flushing,
//! can still reach it from the owning thread. Shutting down always quits the ring
//! first, then joins the worker.

mod reader;
mod writer;

use std::io;
use std::thread::{Builder, JoinHandle};
use crate::{Error, Result};
use crate::OperationKind::Open;
use crate::streams::{Shared, Stream};
pub use reader::*;
pub use writer::*;

/// Spawns a named worker thread.
fn spawn(name: &str, work: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
	let handle = Builder::new()
		.name(name.into())
		.spawn(work)
		.map_err(|err: io::Error| Error::io(Open, err))?;
	tracing::debug!(thread = name, "spawned worker");
	Ok(handle)
}

/// Joins a worker thread if it's still running, logging a panic.
fn join(worker: &mut Option<JoinHandle<()>>) {
	let Some(handle) = worker.take() else { return };
	let name = handle.thread().name().unwrap_or_default().to_owned();
	match handle.join() {
		Ok(()) => tracing::debug!(thread = name, "joined worker"),
		Err(_) => tracing::error!(thread = name, "worker panicked"),
	}
}

/// Takes the source out of a handle after its worker was joined.
fn unshare<S: Stream>(source: Shared<S>) -> Result<S> {
	source.try_unwrap().map_err(|_|
		Error::other(Open, "the source is still shared with a worker", None)
	)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::streams::{MemoryFile, SeekableExt, SeekableStream, State, Stream, StreamExt};
	use super::*;

	#[test]
	fn write_then_read_back() -> Result {
		let mut writer = AsyncWriter::<_, 70>::spawn(MemoryFile::default())?;
		for i in 0..1000u64 {
			writer.write_data(i);
		}
		assert!(writer.ok());
		let mut file = writer.into_inner()?;
		assert_eq!(file.size(), Some(8000));
		assert!(file.reset());

		let mut reader = AsyncReader::<_, 50>::spawn(file)?;
		for i in 0..1000u64 {
			assert_eq!(reader.read_data::<u64>(), Some(i));
		}
		assert_eq!(reader.read_data::<u64>(), None);
		assert_eq!(reader.state(), State::Eof);
		Ok(())
	}
}
