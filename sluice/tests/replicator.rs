// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use sluice::{Buffer, Cache, CacheOptions, Replicator, Result, State, Stream};
use sluice::streams::{MemoryFile, Shared, StreamExt};
use common::Broken;

mod common;

#[test]
fn identical_targets() -> Result {
	let data = common::pattern(5000);
	let targets: Vec<_> = (0..3).map(|_| Shared::new(MemoryFile::default())).collect();
	let mut replicator = Replicator::new();
	for target in &targets {
		replicator.push_back(target.clone())?;
	}

	for chunk in data.chunks(333) {
		assert_eq!(replicator.write(chunk), chunk.len());
	}
	replicator.flush()?;
	for target in &targets {
		assert_eq!(target.acquire().as_slice(), &data[..]);
	}
	Ok(())
}

#[test]
fn broken_target_fails_writes() -> Result {
	let good = Shared::new(MemoryFile::default());
	let mut replicator = Replicator::new();
	replicator.push_back(good.clone())?;
	let broken = replicator.push_back(Broken)?;

	assert_eq!(replicator.write(b"data"), 0);
	assert_eq!(replicator.state(), State::Fail);
	assert!(replicator.flush().is_err());
	assert_eq!(good.acquire().as_slice(), b"data");

	assert!(replicator.remove(broken).is_some());
	assert_eq!(replicator.write(b"more"), 4);
	assert!(replicator.ok());
	Ok(())
}

#[test]
fn decorated_targets() -> Result {
	let data = common::pattern(1000);
	let buffered = Shared::new(MemoryFile::default());
	let cached = Shared::new(MemoryFile::default());

	let mut replicator = Replicator::new();
	replicator.push_back(Buffer::new(buffered.clone()))?;
	replicator.push_back(Cache::with_options(cached.clone(), CacheOptions::new().with_block_size(128))?)?;
	assert_eq!(replicator.write_fully(&data), data.len());
	replicator.flush()?;
	drop(replicator);

	assert_eq!(buffered.acquire().as_slice(), &data[..]);
	assert_eq!(cached.acquire().as_slice(), &data[..]);
	Ok(())
}
