//! Query scan throughput over entity header chunks: how fast `with`/`without`
//! mask filtering finds matches across a large entity population.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;
use std::hint::black_box;
use std::time::Duration;

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

fn build_repo(entity_count: usize) -> EntityRepository {
    let mut repo = EntityRepository::new(EcsConfig::default()).unwrap();
    repo.register_component::<Position>("Position", None).unwrap();
    repo.register_component::<Velocity>("Velocity", None).unwrap();
    repo.set_phase("NetworkReceive").unwrap();
    repo.set_phase("Simulation").unwrap();
    for i in 0..entity_count {
        let e = repo.create_entity().unwrap();
        repo.set_authority::<Position>(e, true).unwrap();
        repo.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        if i % 3 == 0 {
            repo.set_authority::<Velocity>(e, true).unwrap();
            repo.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
        }
    }
    repo
}

fn benchmark_with_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_scan_with_filter");
    group.sample_size(30);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for entity_count in [1_000, 10_000, 100_000].iter() {
        let repo = build_repo(*entity_count);
        group.bench_with_input(
            BenchmarkId::new("entities", entity_count),
            entity_count,
            |b, _| {
                b.iter(|| {
                    let builder = repo.query_with::<Velocity>(repo.query()).unwrap();
                    let results = repo.run_query(builder);
                    black_box(results.len())
                });
            },
        );
    }
    group.finish();
}

fn benchmark_with_and_without(c: &mut Criterion) {
    let repo = build_repo(100_000);
    let mut group = c.benchmark_group("query_scan_with_and_without");
    group.sample_size(30);
    group.bench_function("position_without_velocity", |b| {
        b.iter(|| {
            let builder = repo.query_with::<Position>(repo.query()).unwrap();
            let builder = repo.query_without::<Velocity>(builder).unwrap();
            let results = repo.run_query(builder);
            black_box(results.len())
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_with_filter, benchmark_with_and_without);
criterion_main!(benches);
