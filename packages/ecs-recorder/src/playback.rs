//! Frame application: turns a parsed frame back into repository
//! state, following the exact keyframe/delta sequencing the format
//! requires.

use ecs_core::repository::EntityRepository;

use crate::binding::{ManagedBinding, UnmanagedBinding};
use crate::capture::Bindings;
use crate::error::{RecorderError, RecorderResult};
use crate::frame::{parse_sections, FrameType, ParsedFrame, SectionTag};

fn find_unmanaged<'a>(
    bindings: &'a [Box<dyn UnmanagedBinding>],
    type_id: u16,
) -> Option<&'a dyn UnmanagedBinding> {
    bindings
        .iter()
        .find(|b| b.type_id() == type_id)
        .map(|b| b.as_ref())
}

fn find_managed<'a>(
    bindings: &'a [Box<dyn ManagedBinding>],
    type_id: u16,
) -> Option<&'a dyn ManagedBinding> {
    bindings
        .iter()
        .find(|b| b.type_id() == type_id)
        .map(|b| b.as_ref())
}

fn restore_header_chunk_section(repo: &mut EntityRepository, body: &[u8]) -> RecorderResult<usize> {
    if body.len() < 4 {
        return Err(RecorderError::CorruptFrame("short header-chunk section".into()));
    }
    let chunk_idx = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
    repo.restore_header_chunk(chunk_idx, &body[4..])?;
    Ok(chunk_idx)
}

fn restore_component_chunk_section(
    repo: &mut EntityRepository,
    bindings: &[Box<dyn UnmanagedBinding>],
    body: &[u8],
) -> RecorderResult<()> {
    if body.len() < 6 {
        return Err(RecorderError::CorruptFrame("short component-chunk section".into()));
    }
    let type_id = u16::from_le_bytes(body[0..2].try_into().unwrap());
    let chunk_idx = u32::from_le_bytes(body[2..6].try_into().unwrap()) as usize;
    let raw = &body[6..];
    let binding = find_unmanaged(bindings, type_id).ok_or_else(|| {
        RecorderError::CorruptFrame(format!("no unmanaged binding for type {type_id}"))
    })?;
    binding.restore_chunk(repo, chunk_idx, raw)?;
    let capacity = binding.capacity_per_chunk(repo);
    let liveness = repo.liveness_for_range((chunk_idx * capacity) as u32, capacity);
    binding.sanitize_chunk(repo, chunk_idx, &liveness)?;
    Ok(())
}

fn restore_managed_component_section(
    repo: &mut EntityRepository,
    bindings: &[Box<dyn ManagedBinding>],
    body: &[u8],
) -> RecorderResult<()> {
    if body.len() < 6 {
        return Err(RecorderError::CorruptFrame("short managed-component section".into()));
    }
    let type_id = u16::from_le_bytes(body[0..2].try_into().unwrap());
    let count = u32::from_le_bytes(body[2..6].try_into().unwrap()) as usize;
    let binding = find_managed(bindings, type_id).ok_or_else(|| {
        RecorderError::CorruptFrame(format!("no managed binding for type {type_id}"))
    })?;
    let mut cursor = 6usize;
    for _ in 0..count {
        if cursor + 10 > body.len() {
            return Err(RecorderError::CorruptFrame("truncated managed entry header".into()));
        }
        let entity_index = u32::from_le_bytes(body[cursor..cursor + 4].try_into().unwrap());
        let generation = u16::from_le_bytes(body[cursor + 4..cursor + 6].try_into().unwrap());
        let payload_len = u32::from_le_bytes(body[cursor + 6..cursor + 10].try_into().unwrap()) as usize;
        cursor += 10;
        if cursor + payload_len > body.len() {
            return Err(RecorderError::CorruptFrame("truncated managed payload".into()));
        }
        let payload = &body[cursor..cursor + payload_len];
        cursor += payload_len;
        binding.restore_entity(repo, entity_index, generation, payload)?;
    }
    Ok(())
}

fn restore_destruction_log_section(repo: &mut EntityRepository, body: &[u8]) -> RecorderResult<()> {
    if body.len() < 4 {
        return Err(RecorderError::CorruptFrame("short destruction-log section".into()));
    }
    let count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
    let mut cursor = 4usize;
    for _ in 0..count {
        if cursor + 6 > body.len() {
            return Err(RecorderError::CorruptFrame("truncated destruction entry".into()));
        }
        let index = u32::from_le_bytes(body[cursor..cursor + 4].try_into().unwrap());
        let generation = u16::from_le_bytes(body[cursor + 4..cursor + 6].try_into().unwrap());
        cursor += 6;
        let entity = ecs_core::Entity::new(index, generation);
        if repo.is_alive(entity) {
            repo.destroy_entity(entity)?;
        }
    }
    Ok(())
}

fn restore_event_stream_section(repo: &mut EntityRepository, body: &[u8]) -> RecorderResult<()> {
    if body.len() < 10 {
        return Err(RecorderError::CorruptFrame("short event-stream section".into()));
    }
    let type_id = u16::from_le_bytes(body[0..2].try_into().unwrap());
    let element_size = u32::from_le_bytes(body[2..6].try_into().unwrap()) as usize;
    let byte_len = u32::from_le_bytes(body[6..10].try_into().unwrap()) as usize;
    let bytes = &body[10..];
    if bytes.len() != byte_len {
        return Err(RecorderError::CorruptFrame("event-stream length mismatch".into()));
    }
    // Unregistered streams are skipped rather than failing replay: the
    // consumer for this event type may simply not exist on this run.
    let _ = repo.inject_event_by_recorder_id(type_id, element_size, bytes);
    Ok(())
}

/// Applies one parsed frame to `repo`, following the format's sequencing: clear
/// and full restore for a keyframe; destruction log, then chunks, then
/// managed components for a delta. Returns the frame's `tick` on success.
pub fn apply_frame(
    repo: &mut EntityRepository,
    bindings: &Bindings,
    frame: &ParsedFrame,
) -> RecorderResult<u64> {
    let sections = parse_sections(&frame.payload)?;

    match frame.frame_type {
        FrameType::Keyframe => {
            repo.clear_entity_index()?;
            repo.clear_destruction_log();
        }
        FrameType::Delta => {
            for (tag, body) in &sections {
                if *tag == SectionTag::DestructionLog {
                    restore_destruction_log_section(repo, body)?;
                }
            }
        }
    }

    for (tag, body) in &sections {
        match tag {
            SectionTag::EntityHeaderChunk => {
                restore_header_chunk_section(repo, body)?;
            }
            SectionTag::DestructionLog => {}
            _ => {}
        }
    }

    for (tag, body) in &sections {
        match tag {
            SectionTag::ComponentChunk => {
                restore_component_chunk_section(repo, bindings.unmanaged, body)?;
            }
            SectionTag::ManagedComponent => {
                restore_managed_component_section(repo, bindings.managed, body)?;
            }
            SectionTag::EventStream => {
                restore_event_stream_section(repo, body)?;
            }
            _ => {}
        }
    }

    repo.rebuild_after_restore()?;
    repo.set_global_version(frame.tick as u32);
    Ok(frame.tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{TypedBinding, TypedManagedBinding};
    use crate::capture::{build_delta_payload, build_keyframe_payload};
    use crate::codec::JsonCodec;
    use ecs_core::config::EcsConfig;
    use ecs_core::repository::Transient;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Name(String);
    impl Transient for Name {}

    fn make_repo() -> EntityRepository {
        let mut repo = EntityRepository::new(EcsConfig::default()).unwrap();
        repo.register_component::<Position>("Position", None).unwrap();
        repo.register_component::<Name>("Name", None).unwrap();
        repo.set_phase("NetworkReceive").unwrap();
        repo.set_phase("Simulation").unwrap();
        repo
    }

    #[test]
    fn keyframe_round_trip_preserves_components_and_managed_mask() {
        let mut src = make_repo();
        let e = src.create_entity().unwrap();
        src.set_authority::<Position>(e, true).unwrap();
        src.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        src.add_managed_component(e, Name("Alpha".into())).unwrap();
        src.tick();

        let unmanaged: Vec<Box<dyn crate::binding::UnmanagedBinding>> =
            vec![Box::new(TypedBinding::<Position>::new(&src).unwrap())];
        let managed: Vec<Box<dyn crate::binding::ManagedBinding>> = vec![Box::new(
            TypedManagedBinding::<Name, JsonCodec>::new(&src, JsonCodec).unwrap(),
        )];
        let bindings = Bindings {
            unmanaged: &unmanaged,
            managed: &managed,
        };

        let payload = build_keyframe_payload(&src, &bindings).unwrap();
        let frame = ParsedFrame {
            frame_type: FrameType::Keyframe,
            tick: src.global_version() as u64,
            base_tick: 0,
            payload,
        };

        let mut dst = make_repo();
        apply_frame(&mut dst, &bindings, &frame).unwrap();

        assert_eq!(dst.get_ro::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
        assert_eq!(dst.get_managed_component::<Name>(e).unwrap(), &Name("Alpha".into()));
        let header = dst.entity_generation(e.index).unwrap();
        assert_eq!(header, e.generation);
    }

    #[test]
    fn delta_after_keyframe_applies_destruction_log() {
        let mut src = make_repo();
        let keep = src.create_entity().unwrap();
        let doomed = src.create_entity().unwrap();
        src.set_authority::<Position>(keep, true).unwrap();
        src.set_authority::<Position>(doomed, true).unwrap();
        src.add_component(keep, Position { x: 0.0, y: 0.0 }).unwrap();
        src.add_component(doomed, Position { x: 9.0, y: 9.0 }).unwrap();
        src.tick();

        let unmanaged: Vec<Box<dyn crate::binding::UnmanagedBinding>> =
            vec![Box::new(TypedBinding::<Position>::new(&src).unwrap())];
        let managed: Vec<Box<dyn crate::binding::ManagedBinding>> = vec![];
        let bindings = Bindings {
            unmanaged: &unmanaged,
            managed: &managed,
        };

        let keyframe_payload = build_keyframe_payload(&src, &bindings).unwrap();
        let base_tick = src.global_version() as u64;

        src.destroy_entity(doomed).unwrap();
        src.tick();
        let delta_payload = build_delta_payload(&src, &bindings, base_tick as u32).unwrap();
        let delta_tick = src.global_version() as u64;

        let mut dst = make_repo();
        apply_frame(
            &mut dst,
            &bindings,
            &ParsedFrame {
                frame_type: FrameType::Keyframe,
                tick: base_tick,
                base_tick: 0,
                payload: keyframe_payload,
            },
        )
        .unwrap();
        assert!(dst.is_alive(doomed));

        apply_frame(
            &mut dst,
            &bindings,
            &ParsedFrame {
                frame_type: FrameType::Delta,
                tick: delta_tick,
                base_tick,
                payload: delta_payload,
            },
        )
        .unwrap();

        assert!(!dst.is_alive(doomed));
        assert!(dst.is_alive(keep));
    }
}
