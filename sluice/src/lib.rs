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

//! ## How it works
//!
//! Everything is built on two traits: [`Stream`], a byte stream that can be read,
//! written, flushed and closed, and [`SeekableStream`], a stream with a position,
//! size, and file-like metadata. Reads and writes are *partial*: they return the
//! number of bytes transferred, leaving a [`State`] behind to explain a short
//! count.
//!
//! Functionality is layered by wrapping one stream in another. Each wrapper, or
//! *decorator*, owns its source and forwards what it doesn't handle itself:
//!
//! - [`Converter`] forwards everything, the base other decorators build on.
//! - [`Buffer`] batches small reads and writes into fewer source calls.
//! - [`AsyncReader`] and [`AsyncWriter`] read ahead or write behind on a
//!   background thread, exchanging data through a [`RingBuffer`].
//! - [`Limiter`] and [`Window`] restrict how many bytes pass through, and where
//!   they start. [`FileWindow`] exposes a region of a seekable stream as a
//!   stream of its own.
//! - [`Cache`] keeps one block of a seekable stream in memory, writing it back
//!   when another block is needed.
//! - [`Replicator`] writes the same data to many streams at once, one thread per
//!   target.
//! - [`DiagStream`] runs every operation on several streams and checks that they
//!   all behave the same.
//!
//! To borrow a stream rather than give it away, wrap `&mut stream`; streams are
//! implemented for mutable references and boxes of streams.
//!
//! ### Ring buffer
//!
//! The ring is a fixed-capacity circular byte buffer shared by exactly one
//! producer and one consumer. The producer reserves the free run after the tail,
//! fills it, then pushes how much it filled; the consumer peeks the filled run at
//! the head, reads it, then pops how much it read. Both sides block while there
//! is nothing to do, until the ring is *quit*. Quitting wakes both sides for good
//! and is how background threads are shut down.
//!
//! ### Errors
//!
//! Short transfers are reported through [`State`], everything that can lose data
//! or be misused returns an [`Error`]. Decorators holding data in memory must be
//! closed or unwrapped to learn whether it reached its destination; dropping
//! them is best-effort and logs failures through [`tracing`].

mod async_io;
mod buffer;
mod cache;
mod converter;
mod diag;
mod error;
mod limiter;
mod replicator;
mod window;
pub mod ring;
pub mod streams;

pub use async_io::*;
pub use buffer::*;
pub use cache::*;
pub use converter::*;
pub use diag::*;
pub use error::*;
pub use limiter::*;
pub use replicator::*;
pub use ring::RingBuffer;
pub use streams::{SeekableStream, SeekOffset, State, Stream};
pub use window::*;

/// The block size for skipping, copying, and filling streams.
pub const DEFAULT_BLOCK_SIZE: usize = 0x10000;
/// The default read and write capacity of a [`Buffer`].
pub const DEFAULT_BUFFER_SIZE: usize = 0x400;
/// The default block size of a [`Cache`].
pub const DEFAULT_CACHE_SIZE: usize = 0x1000;
/// The default ring capacity of [`AsyncReader`] and [`AsyncWriter`].
pub const DEFAULT_ASYNC_LIMIT: usize = 0x100000;
