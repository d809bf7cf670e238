//! Builds keyframe/delta payloads from an `EntityRepository` plus the
//! caller-registered component bindings.

use ecs_core::repository::EntityRepository;

use crate::binding::{ManagedBinding, UnmanagedBinding};
use crate::error::RecorderResult;
use crate::frame::{write_section, SectionTag};

pub struct Bindings<'a> {
    pub unmanaged: &'a [Box<dyn UnmanagedBinding>],
    pub managed: &'a [Box<dyn ManagedBinding>],
}

fn write_entity_header_chunks(
    buf: &mut Vec<u8>,
    repo: &EntityRepository,
    base_tick: u32,
    all: bool,
) {
    let capacity_bytes = repo.header_capacity_per_chunk() * std::mem::size_of::<ecs_core::EntityHeader>();
    for chunk_idx in 0..repo.header_chunk_count() {
        if !repo.header_chunk_committed(chunk_idx) {
            continue;
        }
        if !all && repo.header_chunk_version(chunk_idx) <= base_tick {
            continue;
        }
        let mut raw = vec![0u8; capacity_bytes.max(1)];
        // The chunk byte width actually used by ChunkTable is its own
        // chunk_size_bytes, not capacity*size_of(EntityHeader); resize to
        // whatever copy_header_chunk reports as written.
        let written = repo.copy_header_chunk(chunk_idx, &mut raw).unwrap_or(0);
        raw.truncate(written);
        let mut body = Vec::with_capacity(4 + raw.len());
        body.extend_from_slice(&(chunk_idx as u32).to_le_bytes());
        body.extend_from_slice(&raw);
        write_section(buf, SectionTag::EntityHeaderChunk, &body);
    }
}

fn write_component_chunks(
    buf: &mut Vec<u8>,
    repo: &EntityRepository,
    bindings: &[Box<dyn UnmanagedBinding>],
    base_tick: u32,
    all: bool,
) {
    for binding in bindings {
        for chunk_idx in 0..binding.chunk_count(repo) {
            if !binding.chunk_committed(repo, chunk_idx) {
                continue;
            }
            if !all && binding.chunk_version(repo, chunk_idx) <= base_tick {
                continue;
            }
            let mut raw = vec![0u8; 1 << 20];
            let written = binding.copy_chunk(repo, chunk_idx, &mut raw).unwrap_or(0);
            raw.truncate(written);
            let mut body = Vec::with_capacity(6 + raw.len());
            body.extend_from_slice(&binding.type_id().to_le_bytes());
            body.extend_from_slice(&(chunk_idx as u32).to_le_bytes());
            body.extend_from_slice(&raw);
            write_section(buf, SectionTag::ComponentChunk, &body);
        }
    }
}

fn write_managed_components(
    buf: &mut Vec<u8>,
    repo: &EntityRepository,
    bindings: &[Box<dyn ManagedBinding>],
    base_tick: u32,
    all: bool,
) -> RecorderResult<()> {
    for binding in bindings {
        let entities = binding.entities_since(repo, base_tick, all);
        if entities.is_empty() {
            continue;
        }
        let mut body = Vec::new();
        body.extend_from_slice(&binding.type_id().to_le_bytes());
        body.extend_from_slice(&(entities.len() as u32).to_le_bytes());
        for entity_index in entities {
            let generation = repo.entity_generation(entity_index).unwrap_or(0);
            let payload = binding.serialize_entity(repo, entity_index)?;
            body.extend_from_slice(&entity_index.to_le_bytes());
            body.extend_from_slice(&generation.to_le_bytes());
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(&payload);
        }
        write_section(buf, SectionTag::ManagedComponent, &body);
    }
    Ok(())
}

fn write_destruction_log(buf: &mut Vec<u8>, repo: &EntityRepository) {
    let log = repo.get_destruction_log();
    if log.is_empty() {
        return;
    }
    let mut body = Vec::new();
    body.extend_from_slice(&(log.len() as u32).to_le_bytes());
    for &(index, generation) in log {
        body.extend_from_slice(&index.to_le_bytes());
        body.extend_from_slice(&generation.to_le_bytes());
    }
    write_section(buf, SectionTag::DestructionLog, &body);
}

fn write_event_streams(buf: &mut Vec<u8>, repo: &EntityRepository) {
    for (type_id, element_size, bytes) in repo.pending_event_streams() {
        let mut body = Vec::with_capacity(10 + bytes.len());
        body.extend_from_slice(&type_id.to_le_bytes());
        body.extend_from_slice(&(element_size as u32).to_le_bytes());
        body.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&bytes);
        write_section(buf, SectionTag::EventStream, &body);
    }
}

/// Builds a self-contained keyframe payload: every populated chunk of
/// every snapshotable type, no destruction log.
pub fn build_keyframe_payload(repo: &EntityRepository, bindings: &Bindings) -> RecorderResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_entity_header_chunks(&mut buf, repo, 0, true);
    write_component_chunks(&mut buf, repo, bindings.unmanaged, 0, true);
    write_managed_components(&mut buf, repo, bindings.managed, 0, true)?;
    write_event_streams(&mut buf, repo);
    Ok(buf)
}

/// Builds a delta payload relative to `base_tick`: only chunks whose
/// version exceeds `base_tick`, plus the destruction log.
pub fn build_delta_payload(
    repo: &EntityRepository,
    bindings: &Bindings,
    base_tick: u32,
) -> RecorderResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_destruction_log(&mut buf, repo);
    write_entity_header_chunks(&mut buf, repo, base_tick, false);
    write_component_chunks(&mut buf, repo, bindings.unmanaged, base_tick, false);
    write_managed_components(&mut buf, repo, bindings.managed, base_tick, false)?;
    write_event_streams(&mut buf, repo);
    Ok(buf)
}
