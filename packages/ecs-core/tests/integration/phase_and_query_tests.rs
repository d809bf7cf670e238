//! Phase enforcement wired through the repository, and query filtering.

use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Position {
    x: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tag;

#[derive(Clone, Copy, Debug, PartialEq)]
struct SimpleEvent {
    value: u32,
}

fn repo() -> EntityRepository {
    let mut r = EntityRepository::new(EcsConfig::default()).unwrap();
    r.register_component::<Position>("Position", None).unwrap();
    r.register_component::<Tag>("Tag", None).unwrap();
    r.register_component::<SimpleEvent>("SimpleEvent", None).unwrap();
    r
}

#[test]
fn presentation_phase_rejects_every_write_through_the_repository() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    r.set_authority::<Position>(e, true).unwrap();
    for phase in ["NetworkReceive", "Simulation", "NetworkSend", "Presentation"] {
        r.set_phase(phase).unwrap();
    }
    assert!(r.add_component(e, Position { x: 1.0 }).is_err());
}

#[test]
fn simulation_phase_rejects_writes_to_remote_authority_components() {
    let mut r = repo();
    let e = r.create_entity().unwrap();
    r.set_authority::<Position>(e, false).unwrap();
    r.set_phase("NetworkReceive").unwrap();
    r.set_phase("Simulation").unwrap();
    assert!(r.add_component(e, Position { x: 1.0 }).is_err());
}

#[test]
fn query_with_and_without_filters_by_component_mask() {
    let mut r = repo();
    r.set_phase("NetworkReceive").unwrap();
    r.set_phase("Simulation").unwrap();

    let tagged = r.create_entity().unwrap();
    r.set_authority::<Position>(tagged, true).unwrap();
    r.set_authority::<Tag>(tagged, true).unwrap();
    r.add_component(tagged, Position { x: 1.0 }).unwrap();
    r.add_component(tagged, Tag).unwrap();

    let untagged = r.create_entity().unwrap();
    r.set_authority::<Position>(untagged, true).unwrap();
    r.add_component(untagged, Position { x: 2.0 }).unwrap();

    let builder = r.query_with::<Position>(r.query()).unwrap();
    let builder = r.query_without::<Tag>(builder).unwrap();
    let results = r.run_query(builder);

    let matched: Vec<_> = results.iter().collect();
    assert_eq!(matched, vec![untagged]);
}

#[test]
fn publish_swap_and_consume_round_trips_events() {
    let mut r = repo();
    r.publish_event(SimpleEvent { value: 77 });
    r.swap_event_buffers();
    let events = r.consume_events::<SimpleEvent>().unwrap();
    assert_eq!(events, &[SimpleEvent { value: 77 }]);
}
