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

//! A fixed-capacity circular byte buffer connecting one producer thread to one
//! consumer thread.
//!
//! A [`RingBuffer`] is [split](RingBuffer::split) into a [`Producer`] and a
//! [`Consumer`]. Neither handle can be cloned, so there is only ever one of each.
//! The producer [reserves](Producer::back) the free run after the tail, fills it,
//! and [pushes](Reserved::push) the filled length. The consumer
//! [peeks](Consumer::front) the filled run at the head and [pops](Peeked::pop)
//! what it read. Both block until there's something to do or the ring is
//! [quit](RingBuffer::quit).

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::slice;
use std::sync::Arc;
use all_asserts::assert_le;
use parking_lot::{Condvar, Mutex, MutexGuard};

#[derive(Copy, Clone, Debug, Default)]
struct Cursor {
	head: usize,
	size: usize,
	quit: bool,
}

pub struct RingBuffer<const N: usize> {
	data: Box<[UnsafeCell<u8>]>,
	cursor: Mutex<Cursor>,
	/// Signalled when the head moves, freeing space.
	head_moved: Condvar,
	/// Signalled when the tail moves, adding data.
	tail_moved: Condvar,
}

// Safety: the data is only accessed through disjoint regions handed out to the
// unique producer and consumer, with head and size guarded by the mutex.
unsafe impl<const N: usize> Sync for RingBuffer<N> { }

impl<const N: usize> Default for RingBuffer<N> {
	fn default() -> Self { Self::new() }
}

impl<const N: usize> fmt::Debug for RingBuffer<N> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RingBuffer")
		 .field("capacity", &N)
		 .field("cursor", &*self.cursor.lock())
		 .finish_non_exhaustive()
	}
}

impl<const N: usize> RingBuffer<N> {
	const NONZERO: () = assert!(N > 0, "ring capacity must be nonzero");

	/// Creates an empty ring. A capacity of zero fails to compile.
	pub fn new() -> Self {
		#[allow(clippy::let_unit_value)]
		let () = Self::NONZERO;
		Self {
			data: (0..N).map(|_| UnsafeCell::new(0)).collect(),
			cursor: Mutex::default(),
			head_moved: Condvar::new(),
			tail_moved: Condvar::new(),
		}
	}

	/// Splits the ring into its producer and consumer ends.
	pub fn split(self) -> (Producer<N>, Consumer<N>) {
		let ring = Arc::new(self);
		(Producer(Arc::clone(&ring)), Consumer(ring))
	}

	/// Returns the capacity.
	pub const fn capacity(&self) -> usize { N }

	/// Returns the number of bytes pushed but not yet popped.
	pub fn len(&self) -> usize { self.cursor.lock().size }

	/// Returns `true` if no bytes are waiting to be popped.
	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Returns `true` if the ring was quit.
	pub fn is_quit(&self) -> bool { self.cursor.lock().quit }

	/// Cancels the ring, waking both ends. Reservations fail from then on, while
	/// the consumer may still drain what was pushed before. Quitting is permanent;
	/// calling it again does nothing.
	pub fn quit(&self) {
		self.cursor.lock().quit = true;
		tracing::trace!("ring quit");
		self.head_moved.notify_all();
		self.tail_moved.notify_all();
	}

	/// Blocks until all pushed bytes were popped, or the ring is quit.
	pub fn sync(&self) {
		let mut cursor = self.cursor.lock();
		while cursor.size > 0 && !cursor.quit {
			self.head_moved.wait(&mut cursor);
		}
	}

	fn wait_for_space(&self) -> Option<(usize, usize)> {
		let mut cursor = self.cursor.lock();
		while cursor.size == N && !cursor.quit {
			self.head_moved.wait(&mut cursor);
		}
		if cursor.quit { return None }

		let Cursor { head, size, .. } = *cursor;
		let tail = (head + size) % N;
		let len = if head <= tail { N - tail } else { head - tail };
		Some((tail, len))
	}

	fn wait_for_data(&self) -> Option<(usize, usize)> {
		let mut cursor = self.cursor.lock();
		while cursor.size == 0 && !cursor.quit {
			self.tail_moved.wait(&mut cursor);
		}
		if cursor.size == 0 { return None }

		let Cursor { head, size, .. } = *cursor;
		let tail = (head + size) % N;
		let len = if head < tail { size } else { N - head };
		Some((head, len))
	}

	/// Returns `len` bytes starting at `start` as a mutable slice.
	///
	/// # Safety
	///
	/// The region must be claimed by the caller exclusively; it must lie entirely
	/// within either the free or the filled part of the ring, whichever the
	/// caller's end owns.
	#[allow(clippy::mut_from_ref)]
	unsafe fn region(&self, start: usize, len: usize) -> &mut [u8] {
		let ptr = UnsafeCell::raw_get(self.data.as_ptr().add(start));
		slice::from_raw_parts_mut(ptr, len)
	}

	fn lock(&self) -> MutexGuard<'_, Cursor> { self.cursor.lock() }
}

/// The writing end of a [`RingBuffer`].
#[derive(Debug)]
pub struct Producer<const N: usize>(Arc<RingBuffer<N>>);

/// The reading end of a [`RingBuffer`].
#[derive(Debug)]
pub struct Consumer<const N: usize>(Arc<RingBuffer<N>>);

impl<const N: usize> Deref for Producer<N> {
	type Target = RingBuffer<N>;
	fn deref(&self) -> &RingBuffer<N> { &self.0 }
}

impl<const N: usize> Deref for Consumer<N> {
	type Target = RingBuffer<N>;
	fn deref(&self) -> &RingBuffer<N> { &self.0 }
}

impl<const N: usize> Producer<N> {
	/// Reserves the contiguous free run after the tail, blocking while the ring is
	/// full. Returns `None` once the ring is quit.
	pub fn back(&mut self) -> Option<Reserved<'_, N>> {
		let (tail, len) = self.wait_for_space()?;
		// Safety: the free run is only written through this reservation, which
		// borrows the unique producer.
		let data = unsafe { self.region(tail, len) };
		Some(Reserved { ring: &self.0, data, pushed: false })
	}
}

impl<const N: usize> Consumer<N> {
	/// Peeks the contiguous filled run at the head, blocking while the ring is
	/// empty. Returns `None` once the ring is quit and drained.
	pub fn front(&mut self) -> Option<Peeked<'_, N>> {
		let (head, len) = self.wait_for_data()?;
		// Safety: the filled run is not written until popped, and is only read
		// through this peek, which borrows the unique consumer.
		let data = unsafe { self.region(head, len) };
		Some(Peeked { ring: &self.0, data })
	}
}

/// A free region reserved by the [`Producer`]. Fill it, then [`push`](Self::push)
/// the filled length. Dropping the reservation pushes nothing.
pub struct Reserved<'a, const N: usize> {
	ring: &'a RingBuffer<N>,
	data: &'a mut [u8],
	pushed: bool,
}

impl<const N: usize> Reserved<'_, N> {
	/// Commits the first `count` bytes of the region, waking the consumer.
	///
	/// # Panics
	///
	/// Panics if `count` exceeds the reserved length.
	pub fn push(mut self, count: usize) {
		assert_le!(count, self.data.len());
		self.commit(count);
	}

	fn commit(&mut self, count: usize) {
		self.pushed = true;
		self.ring.lock().size += count;
		self.ring.tail_moved.notify_all();
	}
}

impl<const N: usize> Drop for Reserved<'_, N> {
	fn drop(&mut self) {
		if !self.pushed {
			self.commit(0);
		}
	}
}

impl<const N: usize> Deref for Reserved<'_, N> {
	type Target = [u8];
	fn deref(&self) -> &[u8] { self.data }
}

impl<const N: usize> DerefMut for Reserved<'_, N> {
	fn deref_mut(&mut self) -> &mut [u8] { self.data }
}

/// A filled region peeked by the [`Consumer`]. Read it, then [`pop`](Self::pop)
/// the amount consumed. Dropping without popping leaves the data in place.
pub struct Peeked<'a, const N: usize> {
	ring: &'a RingBuffer<N>,
	data: &'a [u8],
}

impl<const N: usize> Peeked<'_, N> {
	/// Releases the first `count` bytes of the region, waking the producer.
	///
	/// # Panics
	///
	/// Panics if `count` exceeds the peeked length.
	pub fn pop(self, count: usize) {
		assert_le!(count, self.data.len());
		{
			let mut cursor = self.ring.lock();
			cursor.head = (cursor.head + count) % N;
			cursor.size -= count;
		}
		self.ring.head_moved.notify_all();
	}
}

impl<const N: usize> Deref for Peeked<'_, N> {
	type Target = [u8];
	fn deref(&self) -> &[u8] { self.data }
}

#[cfg(test)]
mod tests {
	use std::thread;
	use std::time::Duration;
	use quickcheck_macros::quickcheck;
	use super::*;

	#[test]
	fn wraps_around() {
		let (mut producer, mut consumer) = RingBuffer::<8>::new().split();
		let mut region = producer.back().unwrap();
		assert_eq!(region.len(), 8);
		region[..6].copy_from_slice(b"abcdef");
		region.push(6);

		let peeked = consumer.front().unwrap();
		assert_eq!(&*peeked, b"abcdef");
		peeked.pop(4);

		// The free run stops at the end of the data, before wrapping around.
		let mut region = producer.back().unwrap();
		assert_eq!(region.len(), 2);
		region.copy_from_slice(b"gh");
		region.push(2);
		let mut region = producer.back().unwrap();
		assert_eq!(region.len(), 4);
		region[..1].copy_from_slice(b"i");
		region.push(1);

		assert_eq!(&*consumer.front().unwrap(), b"efgh");
		consumer.front().unwrap().pop(4);
		assert_eq!(&*consumer.front().unwrap(), b"i");
		assert_eq!(consumer.len(), 1);
	}

	#[test]
	fn dropped_reservation_pushes_nothing() {
		let (mut producer, consumer) = RingBuffer::<4>::new().split();
		drop(producer.back());
		assert!(consumer.is_empty());
	}

	#[test]
	#[should_panic]
	fn push_past_reservation() {
		let (mut producer, _consumer) = RingBuffer::<4>::new().split();
		producer.back().unwrap().push(5);
	}

	#[test]
	fn quit_wakes_consumer() {
		let (producer, mut consumer) = RingBuffer::<4>::new().split();
		let waiter = thread::spawn(move || consumer.front().is_none());
		thread::sleep(Duration::from_millis(20));
		producer.quit();
		assert!(waiter.join().unwrap());
	}

	#[test]
	fn quit_wakes_producer() {
		let (mut producer, consumer) = RingBuffer::<4>::new().split();
		producer.back().unwrap().push(4);
		let waiter = thread::spawn(move || {
			let blocked = producer.back().is_none();
			producer.sync();
			blocked
		});
		thread::sleep(Duration::from_millis(20));
		consumer.quit();
		assert!(waiter.join().unwrap());
		// Quitting keeps pushed data available to drain.
		assert_eq!(consumer.len(), 4);
	}

	#[test]
	fn drains_after_quit() {
		let (mut producer, mut consumer) = RingBuffer::<4>::new().split();
		producer.back().unwrap().push(3);
		producer.quit();
		assert!(producer.back().is_none());
		consumer.front().unwrap().pop(3);
		assert!(consumer.front().is_none());
	}

	#[quickcheck]
	fn preserves_order(data: Vec<u8>, chunks: Vec<u8>) -> bool {
		let (mut producer, mut consumer) = RingBuffer::<7>::new().split();
		let expected = data.clone();
		let writer = thread::spawn(move || {
			let mut chunks = chunks.into_iter().map(|n| n as usize % 5 + 1).cycle();
			let mut pending = &data[..];
			while !pending.is_empty() {
				let mut region = producer.back().unwrap();
				let count = region.len().min(pending.len()).min(chunks.next().unwrap_or(1));
				region[..count].copy_from_slice(&pending[..count]);
				region.push(count);
				pending = &pending[count..];
			}
			producer.quit();
		});

		let mut actual = Vec::new();
		while let Some(peeked) = consumer.front() {
			let count = peeked.len().min(3);
			actual.extend_from_slice(&peeked[..count]);
			peeked.pop(count);
		}
		writer.join().unwrap();
		actual == expected
	}
}
