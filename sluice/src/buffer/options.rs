// SPDX-License-Identifier: Apache-2.0

use crate::DEFAULT_BUFFER_SIZE;

/// Options for tuning [`Buffer`](super::Buffer)'s behavior and performance.
///
/// # Read capacity
///
/// The number of bytes read ahead from the source in one call. Defaults to
/// `1KiB`. Reads larger than the capacity bypass the buffer and go straight to
/// the source. With a capacity of zero, reads are never buffered.
///
/// # Write capacity
///
/// The number of bytes collected before they're written to the source in one
/// call. Defaults to `1KiB`. As with reading, writes larger than the capacity
/// bypass the buffer once it's flushed, and a capacity of zero disables write
/// buffering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct BufferOptions {
	pub read_capacity: usize,
	pub write_capacity: usize,
}

impl Default for BufferOptions {
	fn default() -> Self { Self::new() }
}

impl BufferOptions {
	/// Creates a new set of buffer options.
	pub const fn new() -> Self {
		Self {
			read_capacity: DEFAULT_BUFFER_SIZE,
			write_capacity: DEFAULT_BUFFER_SIZE,
		}
	}

	/// Presets the options to buffer reads only.
	#[inline]
	pub const fn read_only() -> Self {
		Self::new().with_write_capacity(0)
	}

	/// Presets the options to buffer writes only.
	#[inline]
	pub const fn write_only() -> Self {
		Self::new().with_read_capacity(0)
	}

	/// Returns the read capacity.
	#[inline]
	pub const fn read_capacity(&self) -> usize { self.read_capacity }

	/// Returns the write capacity.
	#[inline]
	pub const fn write_capacity(&self) -> usize { self.write_capacity }

	/// Sets the read capacity.
	#[inline]
	pub fn set_read_capacity(&mut self, value: usize) {
		self.read_capacity = value;
	}

	/// Sets the write capacity.
	#[inline]
	pub fn set_write_capacity(&mut self, value: usize) {
		self.write_capacity = value;
	}

	/// Sets the read capacity.
	#[inline]
	pub const fn with_read_capacity(mut self, value: usize) -> Self {
		self.read_capacity = value;
		self
	}

	/// Sets the write capacity.
	#[inline]
	pub const fn with_write_capacity(mut self, value: usize) -> Self {
		self.write_capacity = value;
		self
	}
}
