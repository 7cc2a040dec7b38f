// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Kerf Contributors.

//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use kerf::collision::{Aabb, Bvh, Collider, Shape};
use kerf::parse::resolve::{Move, MoveKind};
use kerf::parse::Plane;
use kerf::{parse, Dialect, StockConfig, Tool, TriDexelStock, WcsTable};
use nalgebra::Vector3;

/// Serpentine pocket program, one retract per row.
fn serpentine_source(rows: usize) -> String {
    let mut out = String::from("T1 M6\nG0 X-40 Y-40 Z5\nG1 Z-2 F300\n");
    for i in 0..rows {
        let y = -40.0 + (i as f64) * 80.0 / rows.max(1) as f64;
        let x = if i % 2 == 0 { 40.0 } else { -40.0 };
        out.push_str(&format!("G1 X{x:.1} F800\nG1 Y{y:.1}\n"));
    }
    out.push_str("G0 Z10\nM30\n");
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let source = serpentine_source(100);
    let dialect = Dialect::fanuc();
    let wcs = WcsTable::default();
    group.bench_function("resolve_serpentine_200_blocks", |b| {
        b.iter(|| parse::load(black_box(&source), &dialect, &wcs, false));
    });

    let macro_source = "\
#1 = 0
WHILE [#1 LT 50] DO 1
G1 X[#1 * 2 - 50] Y[SIN[#1 * 7.2] * 40] F600
#1 = #1 + 1
END 1
M30
";
    group.bench_function("resolve_macro_loop", |b| {
        b.iter(|| parse::load(black_box(macro_source), &dialect, &wcs, false));
    });

    group.finish();
}

fn slot_move(y: f64, z: f64) -> Move {
    Move {
        kind: MoveKind::Linear,
        start: Vector3::new(-45.0, y, z),
        end: Vector3::new(45.0, y, z),
        a_start: 0.0,
        a_end: 0.0,
        c_start: 0.0,
        c_end: 0.0,
        center: None,
        plane: Plane::Xy,
        feed: 800.0,
        line: 1,
        block: 1,
        wcs: 0,
        tool: 1,
    }
}

fn bench_stock(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock");
    group.sample_size(20);

    let tool = Tool::flat(1, 10.0, 40.0);
    for resolution in [2.0, 1.0, 0.5] {
        let config = StockConfig {
            min: [-50.0, -50.0, -50.0],
            max: [50.0, 50.0, 0.0],
            resolution,
            ..StockConfig::default()
        };
        let stock = TriDexelStock::new(config);
        group.bench_function(format!("slot_cut_res_{resolution}"), |b| {
            b.iter_batched(
                || stock.clone(),
                |mut s| s.cut(black_box(&slot_move(0.0, -2.0)), &tool),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");

    let items: Vec<(usize, Aabb)> = (0..256)
        .map(|i| {
            let x = (i % 16) as f64 * 12.0;
            let y = (i / 16) as f64 * 12.0;
            let min = Vector3::new(x, y, 0.0);
            (i, Aabb::new(min, min + Vector3::repeat(10.0)))
        })
        .collect();

    group.bench_function("bvh_build_256", |b| {
        b.iter(|| Bvh::build(black_box(&items)));
    });

    let bvh = Bvh::build(&items);
    group.bench_function("bvh_refit_and_pairs", |b| {
        b.iter_batched(
            || bvh.clone(),
            |mut t| {
                let probe = Aabb::new(Vector3::new(5.0, 5.0, 0.0), Vector3::new(20.0, 20.0, 10.0));
                t.refit(0, probe);
                t.overlapping_pairs()
            },
            BatchSize::SmallInput,
        );
    });

    let stock = Collider::new(
        Shape::Box {
            half: Vector3::new(50.0, 50.0, 25.0),
        },
        Vector3::new(0.0, 0.0, -25.0),
    );
    let cutter = Collider::new(
        Shape::Cylinder {
            radius: 5.0,
            height: 40.0,
        },
        Vector3::new(0.0, 0.0, -3.0),
    );
    group.bench_function("gjk_epa_cylinder_box", |b| {
        b.iter(|| kerf::collision::gjk::intersect(black_box(&stock), black_box(&cutter)));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_stock, bench_collision);
criterion_main!(benches);
