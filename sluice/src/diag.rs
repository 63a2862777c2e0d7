// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;
use amplify_derive::Display;
use crate::{Error, OperationKind, Result};
use crate::OperationKind::{Close, Flush, Lock, Read, Seek, SetTime, Truncate, Unlock, Write};
use crate::streams::{SeekableStream, SeekOffset, State, Stream};

const SIZE: OperationKind = OperationKind::Other("size");
const SKIP: OperationKind = OperationKind::Other("skip");

/// What the members of a [`DiagStream`] disagreed on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
pub enum Discrepancy {
	#[display("byte count")]
	Count,
	#[display("data")]
	Data,
	#[display("state")]
	State,
	#[display("outcome")]
	Outcome,
	#[display("position")]
	Position,
	#[display("size")]
	Size,
}

/// A member of a [`DiagStream`] that behaved differently from the first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("member #{member} disagrees on {what} during {op}")]
pub struct Mismatch {
	pub op: OperationKind,
	pub what: Discrepancy,
	pub member: usize,
}

/// Keeps the first mismatch of an operation.
fn note(found: &mut Option<Mismatch>, op: OperationKind, member: usize, what: Option<Discrepancy>) {
	if found.is_none() {
		*found = what.map(|what| Mismatch { op, what, member });
	}
}

/// A stream running every operation on several member streams, checking that
/// they all behave the same.
///
/// The first member is the reference: its results are returned and its state
/// becomes the state of the whole. Every other member must return the same
/// count, bytes, position or outcome, and end in the same state. A member that
/// doesn't is logged and recorded as a [`Mismatch`], and the diagnostic stream
/// fails. Operations returning a [`Result`] return an error instead.
///
/// Without members, reads, writes, and seeks fail while flushing and closing
/// succeed.
#[derive(Debug)]
pub struct DiagStream<S> {
	members: Vec<S>,
	scratch: Vec<u8>,
	state: State,
	mismatch: Option<Mismatch>,
}

impl<S: Stream> DiagStream<S> {
	pub fn new(members: Vec<S>) -> Self {
		let state = members.first().map_or(State::Fail, Stream::state);
		Self {
			members,
			scratch: Vec::new(),
			state,
			mismatch: None,
		}
	}

	pub fn members(&self) -> &[S] { &self.members }

	pub fn members_mut(&mut self) -> &mut [S] { &mut self.members }

	pub fn into_members(self) -> Vec<S> { self.members }

	/// Returns the first mismatch found since creation or the last
	/// [`take_mismatch`](Self::take_mismatch).
	pub fn mismatch(&self) -> Option<Mismatch> { self.mismatch }

	/// Takes the recorded mismatch, so later ones are recorded again.
	pub fn take_mismatch(&mut self) -> Option<Mismatch> { self.mismatch.take() }

	/// Sets the state left by the reference member, failing if a mismatch was
	/// found.
	fn finish(&mut self, state: State, found: Option<Mismatch>) {
		self.state = state;
		if let Some(mismatch) = found {
			tracing::warn!(%mismatch, "diagnostic stream members disagree");
			self.state = State::Fail;
			self.mismatch.get_or_insert(mismatch);
		}
	}

	/// Runs `run` on every member, comparing each result to the first member's
	/// with `same`. Returns the first member's result and the first mismatch, or
	/// `None` without members.
	fn each_by<T>(
		&mut self,
		op: OperationKind,
		what: Discrepancy,
		mut run: impl FnMut(&mut S) -> T,
		same: impl Fn(&T, &T) -> bool,
	) -> Option<(T, Option<Mismatch>)> {
		let (first, rest) = self.members.split_first_mut()?;
		let expected = run(first);
		let state = first.state();

		let mut found = None;
		for (index, member) in rest.iter_mut().enumerate() {
			let actual = run(member);
			let discrepancy = if !same(&actual, &expected) {
				Some(what)
			} else if member.state() != state {
				Some(Discrepancy::State)
			} else {
				None
			};
			note(&mut found, op, index + 1, discrepancy);
		}
		self.finish(state, found);
		Some((expected, found))
	}

	fn each<T: PartialEq>(
		&mut self,
		op: OperationKind,
		what: Discrepancy,
		run: impl FnMut(&mut S) -> T,
	) -> Option<T> {
		self.each_by(op, what, run, T::eq).map(|(value, _)| value)
	}

	/// Runs a fallible operation on every member. Members must agree on whether
	/// it succeeded. Without members, returns `empty`.
	fn each_result(
		&mut self,
		op: OperationKind,
		empty: Result,
		run: impl FnMut(&mut S) -> Result,
	) -> Result {
		let same = |a: &Result, b: &Result| a.is_ok() == b.is_ok();
		match self.each_by(op, Discrepancy::Outcome, run, same) {
			Some((_, Some(mismatch))) =>
				Err(Error::other(op, "diagnostic stream members disagree", Some(mismatch.into()))),
			Some((result, None)) => result,
			None => {
				self.state = if empty.is_ok() { State::Ok } else { State::Fail };
				empty
			}
		}
	}
}

impl<S: Stream> Stream for DiagStream<S> {
	fn read(&mut self, buf: &mut [u8]) -> usize {
		let Some((first, rest)) = self.members.split_first_mut() else {
			self.state = State::Fail;
			return 0
		};
		let count = first.read(buf);
		let state = first.state();

		if self.scratch.len() < buf.len() {
			self.scratch.resize(buf.len(), 0);
		}
		let scratch = &mut self.scratch[..buf.len()];
		let mut found = None;
		for (index, member) in rest.iter_mut().enumerate() {
			let read = member.read(scratch);
			let discrepancy = if read != count {
				Some(Discrepancy::Count)
			} else if scratch[..count] != buf[..count] {
				Some(Discrepancy::Data)
			} else if member.state() != state {
				Some(Discrepancy::State)
			} else {
				None
			};
			note(&mut found, Read, index + 1, discrepancy);
		}
		self.finish(state, found);
		count
	}

	fn write(&mut self, buf: &[u8]) -> usize {
		self.each(Write, Discrepancy::Count, |member| member.write(buf))
			.unwrap_or_else(|| {
				self.state = State::Fail;
				0
			})
	}

	fn flush(&mut self) -> Result {
		self.each_result(Flush, Ok(()), S::flush)
	}

	fn close(&mut self) -> Result {
		let result = self.each_result(Close, Ok(()), S::close);
		self.scratch = Vec::new();
		result
	}

	fn skip(&mut self, amount: u64) {
		if self.each(SKIP, Discrepancy::State, |member| member.skip(amount)).is_none() {
			self.state = State::Fail;
		}
	}

	fn state(&self) -> State { self.state }
}

impl<S: SeekableStream> SeekableStream for DiagStream<S> {
	fn seek(&mut self, offset: SeekOffset) -> Option<u64> {
		match self.each_by(Seek, Discrepancy::Position, |member| member.seek(offset), |a, b| a == b) {
			Some((pos, None)) => pos,
			Some(_) => None,
			None => {
				self.state = State::Fail;
				None
			}
		}
	}

	/// Returns the position shared by all members, or `None` if they disagree.
	fn tell(&self) -> Option<u64> {
		let (first, rest) = self.members.split_first()?;
		let pos = first.tell();
		if let Some(index) = rest.iter().position(|member| member.tell() != pos) {
			tracing::warn!(member = index + 1, "diagnostic stream members disagree on position");
			return None
		}
		pos
	}

	fn size(&mut self) -> Option<u64> {
		match self.each_by(SIZE, Discrepancy::Size, S::size, |a, b| a == b) {
			Some((size, None)) => size,
			Some(_) => None,
			None => {
				self.state = State::Fail;
				None
			}
		}
	}

	fn truncate(&mut self) -> Result {
		self.each_result(Truncate, Err(Error::state(Truncate, State::Fail)), S::truncate)
	}

	fn lock(&mut self, offset: u64, length: u64) -> Result {
		self.each_result(Lock, Err(Error::state(Lock, State::Fail)), |member| member.lock(offset, length))
	}

	fn unlock(&mut self, offset: u64, length: u64) -> Result {
		self.each_result(Unlock, Err(Error::state(Unlock, State::Fail)), |member| member.unlock(offset, length))
	}

	fn ctime(&self) -> Option<SystemTime> { self.members.first()?.ctime() }
	fn atime(&self) -> Option<SystemTime> { self.members.first()?.atime() }
	fn mtime(&self) -> Option<SystemTime> { self.members.first()?.mtime() }

	fn set_ctime(&mut self, time: SystemTime) -> Result {
		self.each_result(SetTime, Err(Error::state(SetTime, State::Fail)), |member| member.set_ctime(time))
	}

	fn set_atime(&mut self, time: SystemTime) -> Result {
		self.each_result(SetTime, Err(Error::state(SetTime, State::Fail)), |member| member.set_atime(time))
	}

	fn set_mtime(&mut self, time: SystemTime) -> Result {
		self.each_result(SetTime, Err(Error::state(SetTime, State::Fail)), |member| member.set_mtime(time))
	}
}
