//! Criterion benchmarks for window hit testing and snap zone lookup.
//!
//! The corner-fix pipeline runs [`find_window_and_edge`] on every mouse move
//! over the cached window list; a busy desktop has a few dozen windows.
//!
//! Run with:
//! ```bash
//! cargo bench --package tapwise-core --bench hit_test_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tapwise_core::{
    find_window_and_edge, HitTestConfig, Point, Rect, SnapZoneSet, WindowId, WindowInfo,
};

// ── Fixture builders ──────────────────────────────────────────────────────────

/// `n` cascaded 800×600 windows, each offset 30px from the previous one.
fn cascaded_windows(n: usize) -> Vec<WindowInfo> {
    (0..n)
        .map(|i| {
            let offset = 30.0 * i as f64;
            WindowInfo {
                id: WindowId(i as u32 + 1),
                frame: Rect::new(offset, offset, 800.0, 600.0),
                owner_pid: 100 + i as i32,
                owner_name: format!("App {i}"),
                layer: 0,
            }
        })
        .collect()
}

fn bench_find_window_and_edge(c: &mut Criterion) {
    let config = HitTestConfig::default();
    let mut group = c.benchmark_group("find_window_and_edge");

    for n in [1usize, 10, 50] {
        let windows = cascaded_windows(n);
        // Bottom-right corner of the back-most window: worst case, every
        // window in front of it is inspected first.
        let last = windows[n - 1].frame;
        let point = Point::new(last.max_x() - 1.0, last.max_y() - 1.0);

        group.bench_with_input(BenchmarkId::from_parameter(n), &windows, |b, windows| {
            b.iter(|| find_window_and_edge(black_box(point), black_box(windows), &config))
        });
    }
    group.finish();
}

fn bench_snap_zone_lookup(c: &mut Criterion) {
    let zones = SnapZoneSet::build(
        &[Rect::new(0.0, 0.0, 2560.0, 1440.0), Rect::new(2560.0, 0.0, 1920.0, 1080.0)],
        20.0,
    );
    c.bench_function("snap_zone_set_find", |b| {
        b.iter(|| zones.find(black_box(Point::new(2565.0, 540.0))))
    });
}

criterion_group!(benches, bench_find_window_and_edge, bench_snap_zone_lookup);
criterion_main!(benches);
