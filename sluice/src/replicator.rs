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

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use amplify_derive::Display;
use parking_lot::{Condvar, Mutex, MutexGuard};
use crate::{Error, OperationKind, Result};
use crate::OperationKind::Open;
use crate::streams::{State, Stream};

/// A boxed target stream.
pub type Target = Box<dyn Stream + Send>;

/// Identifies a target attached to a [`Replicator`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display("target #{0}")]
pub struct TargetId(u64);

/// An operation for a worker to run on its target.
#[derive(Default)]
enum Op {
	#[default]
	Noop,
	Write(Arc<[u8]>),
	Flush,
	Close,
	Quit,
}

impl Op {
	fn kind(&self) -> OperationKind {
		match self {
			Op::Write(_) => OperationKind::Write,
			Op::Flush    => OperationKind::Flush,
			Op::Close    => OperationKind::Close,
			Op::Noop | Op::Quit => OperationKind::Other("replicator"),
		}
	}

	fn name(&self) -> &'static str {
		match self {
			Op::Noop     => "noop",
			Op::Write(_) => "write",
			Op::Flush    => "flush",
			Op::Close    => "close",
			Op::Quit     => "quit",
		}
	}
}

/// The op register shared by a worker and the replicator. The worker holds the
/// lock while running an op, and resets it to `Noop` when done.
#[derive(Default)]
struct Task {
	op: Op,
	written: usize,
	state: State,
	result: Option<Error>,
}

#[derive(Default)]
struct Slot {
	task: Mutex<Task>,
	signal: Condvar,
}

struct Worker {
	id: TargetId,
	slot: Arc<Slot>,
	thread: Option<JoinHandle<Target>>,
}

impl Worker {
	fn spawn(id: TargetId, target: Target) -> Result<Self> {
		let slot = Arc::new(Slot::default());
		let thread = {
			let slot = Arc::clone(&slot);
			Builder::new()
				.name(format!("sluice-replicator-{}", id.0))
				.spawn(move || serve(id, target, &slot))
				.map_err(|err| Error::io(Open, err))?
		};
		tracing::debug!(%id, "spawned replicator worker");
		Ok(Self { id, slot, thread: Some(thread) })
	}

	/// Hands `op` to the worker without waiting for it.
	fn send(&self, op: Op) {
		self.slot.task.lock().op = op;
		self.slot.signal.notify_all();
	}

	/// Waits for the worker to finish its op, returning the register.
	fn wait(&self) -> MutexGuard<'_, Task> {
		let mut task = self.slot.task.lock();
		while !matches!(task.op, Op::Noop) {
			self.slot.signal.wait(&mut task);
		}
		task
	}

	/// Waits for the worker to quit, returning its target. Quit must be sent
	/// first.
	fn join(mut self) -> Option<Target> {
		let thread = self.thread.take()?;
		match thread.join() {
			Ok(target) => {
				tracing::debug!(id = %self.id, "joined replicator worker");
				Some(target)
			}
			Err(_) => {
				tracing::error!(id = %self.id, "replicator worker panicked");
				None
			}
		}
	}
}

/// Runs `op` on `target`, returning the bytes written and any error.
fn run(target: &mut Target, op: &Op) -> (usize, Option<Error>) {
	match op {
		Op::Write(data) => (target.write(data), None),
		Op::Flush => (0, target.flush().err()),
		Op::Close => (0, target.close().err()),
		Op::Noop | Op::Quit => (0, None),
	}
}

fn serve(id: TargetId, mut target: Target, slot: &Slot) -> Target {
	let mut task = slot.task.lock();
	// Set once the target panics; it's not touched again until removed.
	let mut panicked = false;
	loop {
		while matches!(task.op, Op::Noop) {
			slot.signal.wait(&mut task);
		}
		tracing::trace!(%id, op = task.op.name(), "running op");
		if matches!(task.op, Op::Quit) { break }

		let outcome = if panicked {
			None
		} else {
			let op = &task.op;
			panic::catch_unwind(AssertUnwindSafe(|| run(&mut target, op))).ok()
		};

		match outcome {
			Some((written, result)) => {
				task.written = written;
				task.result = result;
				task.state = target.state();
			}
			None => {
				if !panicked {
					tracing::error!(%id, "replicator target panicked");
					panicked = true;
				}
				task.written = 0;
				task.result = Some(Error::other(task.op.kind(), "replicator target panicked", None));
				task.state = State::Fail;
			}
		}
		task.op = Op::Noop;
		slot.signal.notify_all();
	}
	target
}

/// A stream writing the same data to many targets at once, each on its own
/// worker thread.
///
/// Every operation is handed to all workers, then waited on until each is done.
/// A write reports the smallest count any target wrote, and the state of the
/// first target that failed. Reading is not supported.
#[derive(Default)]
pub struct Replicator {
	workers: Vec<Worker>,
	next_id: u64,
	state: State,
}

impl Replicator {
	pub fn new() -> Self { Self::default() }

	/// Attaches a target, spawning a worker for it.
	pub fn push_back<T: Stream + Send + 'static>(&mut self, target: T) -> Result<TargetId> {
		let id = TargetId(self.next_id);
		self.next_id += 1;
		self.workers.push(Worker::spawn(id, Box::new(target))?);
		Ok(id)
	}

	/// Detaches a target, stopping its worker. Returns the target, or `None` if it
	/// isn't attached or its worker panicked.
	pub fn remove(&mut self, id: TargetId) -> Option<Target> {
		let index = self.workers.iter().position(|worker| worker.id == id)?;
		let worker = self.workers.remove(index);
		worker.send(Op::Quit);
		worker.join()
	}

	/// Returns the number of targets.
	pub fn len(&self) -> usize { self.workers.len() }

	/// Returns `true` if there are no targets.
	pub fn is_empty(&self) -> bool { self.workers.is_empty() }

	/// Runs `op` on every target and waits for all of them, collecting the first
	/// error.
	fn broadcast(&mut self, op: impl Fn() -> Op) -> Result {
		for worker in &self.workers {
			worker.send(op());
		}

		self.state = State::Ok;
		let mut result = Ok(());
		for worker in &self.workers {
			let mut task = worker.wait();
			if self.state.is_ok() {
				self.state = task.state;
			}
			if let Some(error) = task.result.take() {
				tracing::debug!(id = %worker.id, "{error}");
				if result.is_ok() {
					result = Err(error);
				}
			}
		}
		result
	}
}

impl Stream for Replicator {
	/// Replicators can't be read from; always fails.
	fn read(&mut self, _: &mut [u8]) -> usize {
		self.state = State::Fail;
		0
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		let data: Arc<[u8]> = buf.into();
		for worker in &self.workers {
			worker.send(Op::Write(Arc::clone(&data)));
		}

		self.state = State::Ok;
		let mut written = buf.len();
		for worker in &self.workers {
			let task = worker.wait();
			written = written.min(task.written);
			if self.state.is_ok() && !task.state.is_ok() {
				self.state = task.state;
			}
		}
		written
	}

	fn flush(&mut self) -> Result {
		self.broadcast(|| Op::Flush)
	}

	fn close(&mut self) -> Result {
		self.broadcast(|| Op::Close)
	}

	fn state(&self) -> State { self.state }
}

impl Drop for Replicator {
	fn drop(&mut self) {
		for worker in &self.workers {
			worker.send(Op::Quit);
		}
		for worker in self.workers.drain(..) {
			worker.join();
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use crate::{Limiter, UNLIMITED};
	use crate::streams::{Fifo, MemoryFile, Shared, StreamExt};
	use super::*;

	#[test]
	fn writes_to_all() -> Result {
		let targets: Vec<_> = (0..3).map(|_| Shared::new(MemoryFile::default())).collect();
		let mut replicator = Replicator::new();
		for target in &targets {
			replicator.push_back(target.clone())?;
		}
		assert_eq!(replicator.len(), 3);

		assert_eq!(replicator.write(b"replicated"), 10);
		assert!(replicator.ok());
		replicator.flush()?;
		for target in &targets {
			assert_eq!(target.acquire().as_slice(), b"replicated");
		}
		Ok(())
	}

	#[test]
	fn failing_target() -> Result {
		let good = Shared::new(Fifo::default());
		let mut replicator = Replicator::new();
		replicator.push_back(good.clone())?;
		replicator.push_back(Limiter::new(Fifo::default(), UNLIMITED, 0))?;

		assert_eq!(replicator.write(b"data"), 0);
		assert_eq!(replicator.state(), State::Fail);
		assert_eq!(good.acquire().read_remainder(16), b"data");
		Ok(())
	}

	#[test]
	fn no_targets() {
		let mut replicator = Replicator::new();
		assert_eq!(replicator.write(b"nowhere"), 7);
		assert!(replicator.ok());
		assert!(replicator.flush().is_ok());
	}

	#[test]
	fn remove_returns_target() -> Result {
		let mut replicator = Replicator::new();
		let first = replicator.push_back(Fifo::default())?;
		let second = replicator.push_back(Fifo::default())?;
		replicator.write(b"both");

		let mut target = replicator.remove(first).unwrap();
		assert_eq!(target.read_remainder(16), b"both");
		assert!(replicator.remove(first).is_none());
		assert_eq!(replicator.len(), 1);

		replicator.write(b"one");
		let mut target = replicator.remove(second).unwrap();
		assert_eq!(target.read_remainder(16), b"bothone");
		Ok(())
	}

	#[test]
	fn close_reaches_all() -> Result {
		let targets: Vec<_> = (0..2).map(|_| Shared::new(MemoryFile::default())).collect();
		let mut replicator = Replicator::new();
		for target in &targets {
			replicator.push_back(target.clone())?;
		}

		replicator.write(b"closing");
		replicator.close()?;
		assert!(replicator.ok());
		for target in &targets {
			assert!(target.acquire().as_slice().is_empty());
		}
		Ok(())
	}

	/// Panics on every write.
	struct Explosive;

	impl Stream for Explosive {
		fn read(&mut self, _: &mut [u8]) -> usize { 0 }
		fn write(&mut self, _: &[u8]) -> usize { panic!("write exploded") }
		fn flush(&mut self) -> Result { Ok(()) }
		fn close(&mut self) -> Result { Ok(()) }
		fn skip(&mut self, _: u64) { }
		fn state(&self) -> State { State::Ok }
	}

	#[test]
	fn panicking_target_fails() -> Result {
		let good = Shared::new(Fifo::default());
		let mut replicator = Replicator::new();
		replicator.push_back(good.clone())?;
		let bad = replicator.push_back(Explosive)?;

		assert_eq!(replicator.write(b"data"), 0);
		assert_eq!(replicator.state(), State::Fail);
		assert_eq!(good.acquire().read_remainder(16), b"data");

		// The target isn't touched again, so even a harmless flush reports it.
		let error = replicator.flush().unwrap_err();
		assert!(error.to_string().contains("panicked"), "{error}");
		assert_eq!(replicator.state(), State::Fail);
		assert_eq!(replicator.write(b"more"), 0);

		assert!(replicator.remove(bad).is_some());
		assert_eq!(replicator.write(b"ok"), 2);
		assert!(replicator.ok());
		Ok(())
	}
}
