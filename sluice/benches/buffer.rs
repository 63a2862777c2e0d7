// SPDX-License-Identifier: Apache-2.0

use criterion::{BatchSize, black_box, Criterion, criterion_group, criterion_main, Throughput};
use sluice::{Buffer, BufferOptions, Stream};
use sluice::streams::{MemoryFile, StreamExt};

const SIZE: usize = 0x100000;

fn data() -> Vec<u8> {
	(0..SIZE).map(|i| i as u8).collect()
}

fn small_reads(c: &mut Criterion) {
	let mut group = c.benchmark_group("small_reads");
	group.throughput(Throughput::Bytes(SIZE as u64));
	let data = data();

	group.bench_function("direct", |b| b.iter_batched_ref(
		|| MemoryFile::from_vec(data.clone()),
		|file| {
			let mut buf = [0; 16];
			while file.read(&mut buf) > 0 {
				black_box(&buf);
			}
		},
		BatchSize::LargeInput
	));
	group.bench_function("buffered", |b| b.iter_batched_ref(
		|| Buffer::new(MemoryFile::from_vec(data.clone())),
		|buffer| {
			let mut buf = [0; 16];
			while buffer.read(&mut buf) > 0 {
				black_box(&buf);
			}
		},
		BatchSize::LargeInput
	));
	group.finish();
}

fn small_writes(c: &mut Criterion) {
	let mut group = c.benchmark_group("small_writes");
	group.throughput(Throughput::Bytes(SIZE as u64));

	for capacity in [0x400, 0x4000] {
		group.bench_function(format!("buffered_{capacity:#x}"), |b| b.iter(|| {
			let options = BufferOptions::write_only().with_write_capacity(capacity);
			let mut buffer = Buffer::with_options(MemoryFile::with_capacity(SIZE), options);
			for i in 0..SIZE / 8 {
				buffer.write_data(i as u64);
			}
			buffer.into_inner().unwrap()
		}));
	}
	group.finish();
}

criterion_group!(benches, small_reads, small_writes);
criterion_main!(benches);
