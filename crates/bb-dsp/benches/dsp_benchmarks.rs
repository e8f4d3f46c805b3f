//! DSP hot-path benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use bb_dsp::biquad::BiquadCoeffs;
use bb_dsp::{BiquadTdf2, Compressor, EqStack, LufsMeter, MonoProcessor};

fn bench_biquad(c: &mut Criterion) {
    let mut filter = BiquadTdf2::new(48000.0);
    filter.set_coeffs(BiquadCoeffs::lowpass(1000.0, 0.707, 48000.0));

    let mut buffer: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("biquad_1024", |b| {
        b.iter(|| {
            filter.process_block(black_box(&mut buffer));
        })
    });
}

fn bench_eq_stack_cascade(c: &mut Criterion) {
    let mut eq = EqStack::new(48000.0, 512, 4096);
    for i in 0..8 {
        let mut config = bb_core::EqBandConfig::default();
        config.frequency = 100.0 * (i + 1) as f64;
        config.gain_db = if i % 2 == 0 { 3.0 } else { -3.0 };
        eq.add_band(config).unwrap();
    }

    let mut left: Vec<f64> = (0..512).map(|i| (i as f64 * 0.013).sin()).collect();
    let mut right = left.clone();

    c.bench_function("eq_8_bands_512", |b| {
        b.iter(|| {
            eq.process_block(black_box(&mut left), black_box(&mut right));
        })
    });
}

fn bench_compressor(c: &mut Criterion) {
    let mut comp = Compressor::new(48000.0);
    comp.set_threshold(-18.0);

    let mut left: Vec<f64> = (0..512).map(|i| 0.8 * (i as f64 * 0.02).sin()).collect();
    let mut right = left.clone();

    c.bench_function("compressor_512", |b| {
        b.iter(|| {
            comp.process_block(black_box(&mut left), black_box(&mut right), None);
        })
    });
}

fn bench_lufs_meter(c: &mut Criterion) {
    let mut meter = LufsMeter::new(48000.0);
    let left: Vec<f64> = (0..512).map(|i| 0.5 * (i as f64 * 0.02).sin()).collect();
    let right = left.clone();

    c.bench_function("lufs_512", |b| {
        b.iter(|| {
            meter.process_block(black_box(&left), black_box(&right));
        })
    });
}

criterion_group!(
    benches,
    bench_biquad,
    bench_eq_stack_cascade,
    bench_compressor,
    bench_lufs_meter
);
criterion_main!(benches);
