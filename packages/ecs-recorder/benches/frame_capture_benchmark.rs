//! Keyframe/delta capture throughput over a populated repository.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;
use ecs_recorder::capture::{build_delta_payload, build_keyframe_payload, Bindings};
use ecs_recorder::TypedBinding;
use std::hint::black_box;
use std::time::Duration;

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

fn build_repo(entity_count: usize) -> EntityRepository {
    let mut repo = EntityRepository::new(EcsConfig::default()).unwrap();
    repo.register_component::<Position>("Position", None).unwrap();
    repo.set_phase("NetworkReceive").unwrap();
    repo.set_phase("Simulation").unwrap();
    for _ in 0..entity_count {
        let e = repo.create_entity().unwrap();
        repo.set_authority::<Position>(e, true).unwrap();
        repo.add_component(e, Position { x: 0.0, y: 0.0, z: 0.0 }).unwrap();
    }
    repo
}

fn benchmark_keyframe_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_capture_keyframe");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for entity_count in [1_000, 10_000, 100_000].iter() {
        let repo = build_repo(*entity_count);
        let unmanaged: Vec<Box<dyn ecs_recorder::UnmanagedBinding>> =
            vec![Box::new(TypedBinding::<Position>::new(&repo).unwrap())];
        let bindings = Bindings {
            unmanaged: &unmanaged,
            managed: &[],
        };
        group.bench_with_input(
            BenchmarkId::new("entities", entity_count),
            entity_count,
            |b, _| {
                b.iter(|| {
                    let payload = build_keyframe_payload(&repo, &bindings).unwrap();
                    black_box(payload.len())
                });
            },
        );
    }
    group.finish();
}

fn benchmark_delta_capture(c: &mut Criterion) {
    let mut repo = build_repo(100_000);
    let unmanaged: Vec<Box<dyn ecs_recorder::UnmanagedBinding>> =
        vec![Box::new(TypedBinding::<Position>::new(&repo).unwrap())];
    let bindings = Bindings {
        unmanaged: &unmanaged,
        managed: &[],
    };
    let base_tick = repo.global_version();
    repo.tick();
    for i in 0..1_000 {
        let e = ecs_core::Entity::new(i, 0);
        let _ = repo.set(e, Position { x: 1.0, y: 1.0, z: 1.0 });
    }

    let mut group = c.benchmark_group("frame_capture_delta");
    group.sample_size(20);
    group.bench_function("sparse_update", |b| {
        b.iter(|| {
            let payload = build_delta_payload(&repo, &bindings, base_tick).unwrap();
            black_box(payload.len())
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_keyframe_capture, benchmark_delta_capture);
criterion_main!(benches);
