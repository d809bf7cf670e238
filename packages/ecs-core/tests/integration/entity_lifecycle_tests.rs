//! Entity lifecycle and component-mask properties: creation, destruction,
//! slot reuse, and mask bookkeeping.

use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Health(i32);

fn repo() -> EntityRepository {
    let mut r = EntityRepository::new(EcsConfig::default()).unwrap();
    r.register_component::<Health>("Health", None).unwrap();
    r.set_phase("NetworkReceive").unwrap();
    r.set_phase("Simulation").unwrap();
    r
}

#[test]
fn create_and_destroy_flips_liveness() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    assert!(r.is_alive(e));
    r.destroy_entity(e).unwrap();
    assert!(!r.is_alive(e));
}

#[test]
fn destroyed_slot_is_reused_with_incremented_generation() {
    let mut r = repo();
    let e1 = r.create_entity().unwrap();
    r.destroy_entity(e1).unwrap();
    let e2 = r.create_entity().unwrap();
    assert_eq!(e2.index, e1.index);
    assert_eq!(e2.generation, e1.generation + 1);
}

#[test]
fn add_component_sets_mask_and_remove_clears_it() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    r.set_authority::<Health>(e, true).unwrap();

    assert!(r.get_ro::<Health>(e).is_err(), "no component yet");
    r.add_component(e, Health(100)).unwrap();
    assert_eq!(r.get_ro::<Health>(e).unwrap(), Health(100));

    r.remove_component::<Health>(e).unwrap();
    assert!(r.get_ro::<Health>(e).is_err(), "mask bit should be cleared");
}

#[test]
fn destroying_clears_component_mask_for_the_slot() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    r.set_authority::<Health>(e, true).unwrap();
    r.add_component(e, Health(5)).unwrap();
    r.destroy_entity(e).unwrap();

    let reused = r.create_entity().unwrap();
    assert_eq!(reused.index, e.index);
    assert!(
        r.get_ro::<Health>(reused).is_err(),
        "a freshly recycled slot must not inherit the previous occupant's mask"
    );
}

#[test]
fn dead_entity_rejects_component_access() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    r.destroy_entity(e).unwrap();
    assert!(r.set_authority::<Health>(e, true).is_err());
    assert!(r.get_ro::<Health>(e).is_err());
}
