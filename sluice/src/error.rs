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

use std::error::Error as StdError;
use std::{io, result};
use amplify_derive::Display;
use crate::streams::State;

pub type ErrorBox = Box<dyn StdError + Send + Sync>;
pub type Result<T = ()> = result::Result<T, Error>;

/// The stream operation an [`Error`] occurred in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Display)]
pub enum OperationKind {
	#[default]
	#[display("unknown operation")]
	Unknown,
	#[display("read")]
	Read,
	#[display("write")]
	Write,
	#[display("flush")]
	Flush,
	#[display("close")]
	Close,
	#[display("seek")]
	Seek,
	#[display("truncate")]
	Truncate,
	#[display("lock")]
	Lock,
	#[display("unlock")]
	Unlock,
	#[display("set timestamp")]
	SetTime,
	#[display("open")]
	Open,
	#[display("{0}")]
	Other(&'static str)
}

/// The kind of failure behind an [`Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
pub enum ErrorKind {
	/// The stream reported a failed state.
	#[display("stream failed")]
	Fail,
	/// The stream reached its end before the operation completed.
	#[display("premature end-of-stream")]
	Eof,
	/// Bytes the caller was told were written could not be delivered.
	#[display("buffered data was lost")]
	DataLoss,
	#[display("operation not supported")]
	Unsupported,
	#[display("invalid argument")]
	InvalidArgument,
	#[display("IO error")]
	Io,
	#[display("{0}")]
	Other(&'static str),
}

/// A stream error: what was being done, what went wrong, and optionally why.
#[derive(Debug, thiserror::Error)]
#[error("{op} failed; {kind}{}", describe_source(.source))]
pub struct Error {
	op: OperationKind,
	kind: ErrorKind,
	#[source]
	source: Option<ErrorBox>,
}

fn describe_source(source: &Option<ErrorBox>) -> String {
	source.as_ref()
		  .map(|source| format!(" ({source})"))
		  .unwrap_or_default()
}

impl Error {
	pub(crate) fn new(
		op: OperationKind,
		kind: ErrorKind,
		source: Option<ErrorBox>
	) -> Self {
		Self { op, kind, source }
	}

	/// Creates a new error with a custom message.
	pub fn other(
		op: OperationKind,
		message: &'static str,
		source: Option<ErrorBox>
	) -> Self {
		Self::new(op, ErrorKind::Other(message), source)
	}

	/// Creates an error from a non-[`Ok`](State::Ok) stream state.
	pub fn state(op: OperationKind, state: State) -> Self {
		let kind = match state {
			State::Eof => ErrorKind::Eof,
			_ => ErrorKind::Fail
		};
		Self::new(op, kind, None)
	}

	/// Creates a new "data loss" error.
	pub fn data_loss(op: OperationKind) -> Self {
		Self::new(op, ErrorKind::DataLoss, None)
	}

	/// Creates a new "unsupported" error.
	pub fn unsupported(op: OperationKind) -> Self {
		Self::new(op, ErrorKind::Unsupported, None)
	}

	/// Creates a new "invalid argument" error with a message.
	pub fn invalid_argument(op: OperationKind, message: &'static str) -> Self {
		Self::new(op, ErrorKind::InvalidArgument, Some(message.into()))
	}

	/// Creates a new IO error.
	pub fn io(op: OperationKind, error: io::Error) -> Self {
		Self::new(op, ErrorKind::Io, Some(error.into()))
	}

	/// Returns the operation kind.
	pub fn operation(&self) -> OperationKind { self.op }

	/// Sets the operation kind.
	pub fn with_operation(mut self, op: OperationKind) -> Self {
		self.op = op;
		self
	}

	/// Returns the error kind.
	pub fn kind(&self) -> ErrorKind { self.kind }

	/// Returns `true` if buffered data was lost.
	pub fn is_data_loss(&self) -> bool {
		self.kind == ErrorKind::DataLoss
	}

	/// Returns the source downcast into an IO Error, if possible.
	pub fn io_source(&self) -> Option<&io::Error> {
		self.source.as_deref()?.downcast_ref()
	}
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		if let io::ErrorKind::UnexpectedEof = value.kind() {
			Self::new(OperationKind::Unknown, ErrorKind::Eof, Some(value.into()))
		} else {
			Self::io(OperationKind::Unknown, value)
		}
	}
}

impl From<Error> for io::Error {
	fn from(value: Error) -> Self {
		let kind = match value.kind {
			ErrorKind::Eof => io::ErrorKind::UnexpectedEof,
			ErrorKind::Unsupported => io::ErrorKind::Unsupported,
			ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
			ErrorKind::DataLoss => io::ErrorKind::WriteZero,
			_ => io::ErrorKind::Other
		};
		io::Error::new(kind, value)
	}
}

/// Converts a stream state into a result, attaching `op` on failure.
pub(crate) fn check(state: State, op: OperationKind) -> Result {
	if state.is_ok() {
		Ok(())
	} else {
		Err(Error::state(op, state))
	}
}
