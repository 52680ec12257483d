//! Benchmarks for message decoding and acknowledgment encoding

use criterion::{Criterion, criterion_group, criterion_main};
use fleetwire::protocol::{FrameFormat, FrameReassembler, FrameValidator, MessageDecoder, ResponseEncoder};
use fleetwire::test_utils::{PositionFixture, TEST_IMEI, alarm_frame, location_frame, login_frame};
use fleetwire::types::Frame;
use std::hint::black_box;

fn validated(format: FrameFormat, bytes: &[u8]) -> Frame {
    let candidate = FrameReassembler::new(format).push(bytes).remove(0);
    FrameValidator::new(format).validate(&candidate).expect("fixture frame must validate")
}

fn bench_decode(c: &mut Criterion) {
    let format = FrameFormat::default();
    let decoder = MessageDecoder::default();
    let position = PositionFixture::default();

    let login = validated(format, &login_frame(format, TEST_IMEI, 1));
    let location = validated(format, &location_frame(format, &position, 2));
    let alarm = validated(format, &alarm_frame(format, &position, 0x01, 3));

    let mut group = c.benchmark_group("decode");
    group.bench_function("login", |b| b.iter(|| decoder.decode(black_box(&login))));
    group.bench_function("location", |b| b.iter(|| decoder.decode(black_box(&location))));
    group.bench_function("alarm", |b| b.iter(|| decoder.decode(black_box(&alarm))));
    group.finish();
}

fn bench_respond(c: &mut Criterion) {
    let format = FrameFormat::default();
    let encoder = ResponseEncoder::new(format);
    let login = MessageDecoder::default()
        .decode(&validated(format, &login_frame(format, TEST_IMEI, 1)))
        .expect("fixture login must decode");

    c.bench_function("login_ack", |b| b.iter(|| encoder.respond(black_box(&login))));
}

criterion_group!(benches, bench_decode, bench_respond);
criterion_main!(benches);
