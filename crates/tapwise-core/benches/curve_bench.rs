//! Criterion benchmarks for the curve engine.
//!
//! The acceleration pipeline calls [`VelocityMapper::scale`] once per pointer
//! movement event, so it has to stay far below the 5ms per-event budget of an
//! event tap callback.
//!
//! Run with:
//! ```bash
//! cargo bench --package tapwise-core --bench curve_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tapwise_core::curve::{accelerate, solve_for_x};
use tapwise_core::{AccelerationCurve, CurvePreset, VelocityMapper};

fn bench_solve_for_x(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_for_x");
    for preset in CurvePreset::ALL {
        let curve = AccelerationCurve::preset(preset);
        group.bench_with_input(BenchmarkId::from_parameter(preset), &curve, |b, curve| {
            b.iter(|| solve_for_x(black_box(curve), black_box(0.37)))
        });
    }
    group.finish();
}

fn bench_accelerate_sweep(c: &mut Criterion) {
    let curve = AccelerationCurve::preset(CurvePreset::Precision);
    c.bench_function("accelerate_sweep_100", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..100 {
                sum += accelerate(&curve, black_box(f64::from(i) / 100.0));
            }
            sum
        })
    });
}

fn bench_velocity_mapper_scale(c: &mut Criterion) {
    let mapper = VelocityMapper::new(AccelerationCurve::preset(CurvePreset::Gaming), 0.5, 60.0);
    c.bench_function("velocity_mapper_scale", |b| {
        b.iter(|| mapper.scale(black_box(7.0), black_box(-3.0)))
    });
}

criterion_group!(
    benches,
    bench_solve_for_x,
    bench_accelerate_sweep,
    bench_velocity_mapper_scale
);
criterion_main!(benches);
