//! Criterion benchmarks for the write-ahead ring
//!
//! Run with: cargo bench -p writeahead-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use writeahead_core::{ChannelBufferSet, RingBuffer};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("RingBuffer");

    for &block_size in BLOCK_SIZES {
        let block = vec![0.25f32; block_size];
        let mut out = vec![0.0f32; block_size];

        group.bench_with_input(
            BenchmarkId::new("write_read", block_size),
            &block_size,
            |b, _| {
                let ring = RingBuffer::new(SAMPLE_RATE, 1);
                b.iter(|| {
                    let _ = ring.write(black_box(&block));
                    black_box(ring.read(&mut out));
                });
            },
        );
    }

    // Read path alone, as the audio callback sees it once rendering stalls
    group.bench_function("read_starved_512", |b| {
        let ring = RingBuffer::new(SAMPLE_RATE, 1);
        let mut out = vec![0.0f32; 512];
        b.iter(|| black_box(ring.read(black_box(&mut out))));
    });

    group.finish();
}

fn bench_channel_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChannelBufferSet");

    for channels in [2usize, 8] {
        let block = vec![0.5f32; 256];
        let mut out = vec![0.0f32; 256];

        group.bench_with_input(
            BenchmarkId::new("chunk_256", channels),
            &channels,
            |b, &channels| {
                let set = ChannelBufferSet::new(channels, SAMPLE_RATE, 2400, 4);
                b.iter(|| {
                    for ch in 0..channels {
                        let _ = set.write(ch, black_box(&block));
                    }
                    black_box(set.min_fill_percentage());
                    for ch in 0..channels {
                        set.read(ch, &mut out);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_write_read, bench_channel_set);
criterion_main!(benches);
