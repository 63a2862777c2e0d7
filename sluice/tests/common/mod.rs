// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sluice::{Error, Result, State, Stream};
use sluice::OperationKind::{Close, Flush};

#[ctor::ctor]
fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.with_thread_names(true)
		.try_init();
}

/// Operation counts of a [`Counted`] stream, readable after the stream is moved
/// into a decorator or another thread.
#[derive(Clone, Debug, Default)]
pub struct Calls {
	reads: Arc<AtomicUsize>,
	writes: Arc<AtomicUsize>,
	flushes: Arc<AtomicUsize>,
}

impl Calls {
	pub fn reads(&self) -> usize { self.reads.load(Ordering::Relaxed) }
	pub fn writes(&self) -> usize { self.writes.load(Ordering::Relaxed) }
	pub fn flushes(&self) -> usize { self.flushes.load(Ordering::Relaxed) }
}

/// A stream counting the operations that reach its source.
pub struct Counted<S> {
	pub source: S,
	pub calls: Calls,
}

impl<S> Counted<S> {
	pub fn new(source: S) -> (Self, Calls) {
		let calls = Calls::default();
		(Self { source, calls: calls.clone() }, calls)
	}
}

impl<S: Stream> Stream for Counted<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		self.calls.reads.fetch_add(1, Ordering::Relaxed);
		self.source.read(buf)
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		self.calls.writes.fetch_add(1, Ordering::Relaxed);
		self.source.write(buf)
	}

	fn flush(&mut self) -> Result {
		self.calls.flushes.fetch_add(1, Ordering::Relaxed);
		self.source.flush()
	}

	fn close(&mut self) -> Result { self.source.close() }

	fn state(&self) -> State { self.source.state() }
}

/// A stream failing every operation.
#[derive(Default)]
pub struct Broken;

impl Stream for Broken {
	fn read(&mut self, _: &mut [u8]) -> usize { 0 }
	fn write(&mut self, _: &[u8]) -> usize { 0 }
	fn flush(&mut self) -> Result { Err(Error::state(Flush, State::Fail)) }
	fn close(&mut self) -> Result { Err(Error::state(Close, State::Fail)) }
	fn state(&self) -> State { State::Fail }
}

/// Returns `len` bytes of a repeating, position-dependent pattern.
pub fn pattern(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i % 251) as u8).collect()
}
