use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use navgrid::prelude::*;

/// A world with scattered walls, deterministic per seed.
fn sparse_world(side: i32, wall_chance: f64, seed: u64) -> World {
    let mut world = World::with_chunk_size(side, side, 16, 16);
    let mut rng = Pcg32::seed_from_u64(seed);
    for y in 0..side {
        for x in 0..side {
            if rng.gen_bool(wall_chance) {
                world.set_cell(x, y, 0, CellKind::Wall);
            }
        }
    }
    // Keep the benchmark corners open so queries do not trivially fail.
    for (x, y) in [(2, 2), (side - 3, side - 3)] {
        world.set_cell(x, y, 0, CellKind::Ground);
    }
    world
}

fn bench_graph_build(c: &mut Criterion) {
    c.bench_function("full graph build 128x128", |b| {
        b.iter_batched(
            || sparse_world(128, 0.2, 4),
            |mut world| world.update_dirty_chunks(),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("incremental update after one edit 128x128", |b| {
        b.iter_batched(
            || {
                let mut world = sparse_world(128, 0.2, 4);
                world.update_dirty_chunks();
                world.set_cell(64, 64, 0, CellKind::Wall);
                world
            },
            |mut world| world.update_dirty_chunks(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_queries(c: &mut Criterion) {
    let mut world = sparse_world(128, 0.2, 4);
    world.update_dirty_chunks();
    let start = Point::new(2, 2, 0);
    let goal = Point::new(125, 125, 0);

    c.bench_function("hpa query 128x128", |b| {
        b.iter(|| world.find_path(PathAlgorithm::Hpa, start, goal))
    });
    c.bench_function("a_star query 128x128", |b| {
        b.iter(|| world.find_path(PathAlgorithm::AStar, start, goal))
    });
    c.bench_function("jps query 128x128", |b| {
        b.iter(|| world.find_path(PathAlgorithm::Jps, start, goal))
    });
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("tick with 500 movers 128x128", |b| {
        b.iter_batched(
            || {
                let mut world = sparse_world(128, 0.1, 9);
                world.config = NavConfig::TESTING;
                world.config.endless_mover_mode = true;
                world.seed_rng(9);
                let mut placed = 0;
                'outer: for y in 0..128 {
                    for x in 0..128 {
                        if placed >= 500 {
                            break 'outer;
                        }
                        if world.is_cell_walkable_at(x, y, 0) && (x + y) % 5 == 0 {
                            let _ = world.spawn_mover_at_cell(
                                Point::new(x, y, 0),
                                Point::new(125, 125, 0),
                                100.0,
                            );
                            placed += 1;
                        }
                    }
                }
                world.run_ticks(60);
                world
            },
            |mut world| world.run_ticks(10),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_graph_build, bench_queries, bench_tick);
criterion_main!(benches);
