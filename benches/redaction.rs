//! Redaction throughput benchmark.
//!
//! Redaction sits on every request path and must stay linear in input
//! length, including on adversarial digit-heavy input. Sizes are chosen to
//! make superlinear behavior obvious across runs.

use criterion::{Criterion, criterion_group, criterion_main};
use scrubgate::MessageRedactor;
use std::hint::black_box;

/// Builds input of roughly `size` bytes with PII scattered through it.
fn build_input(size: usize) -> String {
    let chunk = "Customer wrote from test@example.com about card \
                 4242-4242-4242-4242 and SSN 123-45-6789, order 12345678. ";
    let mut input = String::with_capacity(size + chunk.len());
    while input.len() < size {
        input.push_str(chunk);
    }
    input
}

/// Digit-heavy input that never matches: long runs just under and over the
/// pattern widths, exercising boundary checks everywhere.
fn build_adversarial(size: usize) -> String {
    let chunk = "12345678 1234567890123456789012345 1111-2222-3333 ";
    let mut input = String::with_capacity(size + chunk.len());
    while input.len() < size {
        input.push_str(chunk);
    }
    input
}

fn bench_redaction(c: &mut Criterion) {
    let redactor = MessageRedactor::new();

    let mut group = c.benchmark_group("redact");
    for size in [1 << 10, 1 << 15, 1 << 20] {
        let input = build_input(size);
        group.bench_function(format!("pii_{size}"), |b| {
            b.iter(|| redactor.redact(black_box(&input)));
        });

        let adversarial = build_adversarial(size);
        group.bench_function(format!("adversarial_{size}"), |b| {
            b.iter(|| redactor.redact(black_box(&adversarial)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_redaction);
criterion_main!(benches);
