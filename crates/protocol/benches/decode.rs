//! Benchmarks for status decoding and change detection
//!
//! The monitor polls every 100ms, so none of this is hot, but a regression
//! here would show up on slow hosts like a Raspberry Pi Zero.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use protocol::{ChangeRecord, Envelope, HwStatus, USB_COMMAND_CODE, diff};

fn benchmark_envelope(c: &mut Criterion) {
    let cdb = [0xC2, 0, 0, 0, 0, 0, 0, 0, 0x0C, 0];
    c.bench_function("wrap_hw_status", |b| {
        b.iter(|| Envelope::wrap(black_box(USB_COMMAND_CODE), black_box(&cdb)))
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let reply = [0, 0, 0, 0x80, 0x01, 0, 0, 0, 0, 0, 0, 0];
    group.bench_function("decode_12_bytes", |b| {
        b.iter(|| HwStatus::decode(black_box(&reply)))
    });

    let oversized = [0xA5u8; 512];
    group.bench_function("decode_truncated", |b| {
        b.iter(|| HwStatus::decode(black_box(&oversized)))
    });

    group.finish();
}

fn benchmark_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    let idle = HwStatus::decode(&[0, 0, 0, 0x80, 0, 0, 0, 0, 0, 0, 0, 0]);
    let busy = HwStatus::decode(&[0, 0, 0, 0x00, 0x21, 0x10, 0x01, 0, 0, 0, 0, 0]);

    group.bench_function("unchanged", |b| {
        b.iter(|| diff(black_box(&idle), black_box(&idle)))
    });

    group.bench_function("changed_and_rendered", |b| {
        b.iter(|| ChangeRecord::between(black_box(&idle), black_box(&busy)).lines())
    });

    group.finish();
}

criterion_group!(benches, benchmark_envelope, benchmark_decode, benchmark_diff);
criterion_main!(benches);
