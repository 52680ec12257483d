//! Benchmarks for stream reassembly and validation
//!
//! Measures throughput of the per-connection hot path:
//! - Cutting frames out of a stream delivered in TCP-sized chunks
//! - Resynchronising after line noise
//! - Checksum verification for both strategies

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fleetwire::protocol::{ChecksumStrategy, FrameFormat, FrameReassembler, FrameValidator};
use fleetwire::test_utils::{PositionFixture, TEST_IMEI, heartbeat_frame, location_frame, login_frame};
use std::hint::black_box;

/// A login followed by alternating locations and heartbeats.
fn device_stream(format: FrameFormat, frames: u16) -> Vec<u8> {
    let mut stream = login_frame(format, TEST_IMEI, 0).to_vec();
    for seq in 1..frames {
        if seq % 10 == 0 {
            stream.extend_from_slice(&heartbeat_frame(format, seq));
        } else {
            stream.extend_from_slice(&location_frame(format, &PositionFixture::default(), seq));
        }
    }
    stream
}

fn bench_chunk_sizes(c: &mut Criterion) {
    let format = FrameFormat::default();
    let stream = device_stream(format, 1000);

    let mut group = c.benchmark_group("reassembly_chunk_size");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut reassembler = FrameReassembler::new(format);
                let mut frames = 0;
                for chunk in stream.chunks(size) {
                    frames += reassembler.push(black_box(chunk)).len();
                }
                black_box(frames)
            })
        });
    }

    group.finish();
}

fn bench_noise_recovery(c: &mut Criterion) {
    let format = FrameFormat::default();
    let mut stream = vec![0x55u8; 64 * 1024];
    stream.extend_from_slice(&login_frame(format, TEST_IMEI, 1));

    let mut group = c.benchmark_group("reassembly_noise");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("64k_noise_then_frame", |b| {
        b.iter(|| {
            let mut reassembler = FrameReassembler::new(format);
            let frames: usize =
                stream.chunks(4096).map(|chunk| reassembler.push(black_box(chunk)).len()).sum();
            black_box(frames)
        })
    });
    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    for strategy in [ChecksumStrategy::Sum8, ChecksumStrategy::Crc16] {
        let format = FrameFormat::new(strategy);
        let candidates = FrameReassembler::new(format).push(&device_stream(format, 100));
        let validator = FrameValidator::new(format);

        group.throughput(Throughput::Elements(candidates.len() as u64));
        group.bench_function(strategy.name(), |b| {
            b.iter(|| {
                candidates
                    .iter()
                    .filter(|candidate| validator.validate(black_box(candidate)).is_ok())
                    .count()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_sizes, bench_noise_recovery, bench_validation);
criterion_main!(benches);
