//! Minimal tick-driven simulation used to exercise `record`/`replay`/`seek`.
//! Entities drift under a constant velocity; nothing about this is part of
//! the engine itself.

use anyhow::Result;
use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;
use ecs_core::time::{SystemClock, TimeSystem};

#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Fixed per-tick timestep the demo advances the `GlobalTime` singleton by.
const DEMO_DT: f64 = 1.0 / 60.0;

pub fn build_demo_repo(
    config: &EcsConfig,
    entity_count: u32,
) -> Result<(EntityRepository, TimeSystem<SystemClock>)> {
    let mut repo = EntityRepository::new(config.clone())?;
    repo.register_component::<Position>("Position", None)?;
    repo.register_component::<Velocity>("Velocity", None)?;
    repo.set_phase("NetworkReceive")?;
    repo.set_phase("Simulation")?;

    for i in 0..entity_count {
        let entity = repo.create_entity()?;
        repo.set_authority::<Position>(entity, true)?;
        repo.set_authority::<Velocity>(entity, true)?;
        repo.add_component(entity, Position { x: i as f32, y: 0.0 })?;
        repo.add_component(entity, Velocity { x: 0.1, y: -0.05 })?;
    }
    let time_system = TimeSystem::new(&mut repo, SystemClock::default());
    Ok((repo, time_system))
}

/// Advances every entity's position by its velocity for one tick, and the
/// `GlobalTime` singleton by one fixed deterministic step.
pub fn advance(repo: &mut EntityRepository, time_system: &mut TimeSystem<SystemClock>) {
    time_system.step(repo, DEMO_DT);

    let builder = repo.query_with::<Position>(repo.query()).unwrap();
    let builder = repo.query_with::<Velocity>(builder).unwrap();
    let results = repo.run_query(builder);
    let entities: Vec<_> = results.iter().collect();
    for entity in entities {
        let velocity = repo.get_ro::<Velocity>(entity).unwrap();
        let mut position = repo.get_ro::<Position>(entity).unwrap();
        position.x += velocity.x;
        position.y += velocity.y;
        repo.set(entity, position).unwrap();
    }
}
