// SPDX-License-Identifier: Apache-2.0

use crate::DEFAULT_CACHE_SIZE;

/// Options for tuning [`Cache`](super::Cache)'s behavior and performance.
///
/// # Block size
///
/// The size of the block held in memory, and the alignment of its start in the
/// source. Defaults to `4KiB`. Accesses within one block never reach the source;
/// moving to another block writes the current one back if it was modified, then
/// reads the next. A block size of zero is invalid.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CacheOptions {
	pub block_size: usize,
}

impl Default for CacheOptions {
	fn default() -> Self { Self::new() }
}

impl CacheOptions {
	/// Creates a new set of cache options.
	pub const fn new() -> Self {
		Self { block_size: DEFAULT_CACHE_SIZE }
	}

	/// Returns the block size.
	#[inline]
	pub const fn block_size(&self) -> usize { self.block_size }

	/// Sets the block size.
	#[inline]
	pub fn set_block_size(&mut self, value: usize) {
		self.block_size = value;
	}

	/// Sets the block size.
	#[inline]
	pub const fn with_block_size(mut self, value: usize) -> Self {
		self.block_size = value;
		self
	}
}
