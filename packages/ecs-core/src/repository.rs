//! Entity repository: composes the type registry, entity index, per-type
//! chunk tables, metadata table, phase machine, and event bus into the
//! public ECS surface.

use std::any::Any;
use std::collections::HashMap;

use crate::chunk_table::{ChunkTable, ErasedChunkTable};
use crate::config::EcsConfig;
use crate::entity::{Bitmap256, Entity};
use crate::entity_index::EntityIndex;
use crate::error::{EcsError, EcsResult};
use crate::event_bus::EventBus;
use crate::metadata_table::MetadataTable;
use crate::phase::{PhaseConfig, PhaseMachine};
use crate::types::ComponentTypeRegistry;

/// Marker trait for components eligible for managed (non-POD) storage.
/// Stands in for the source's `[Transient]` attribute: implement it for any
/// type whose snapshot semantics you've verified are safe (typically an
/// immutable record rather than a mutable reference type).
pub trait Transient: 'static {}

pub struct EntityRepository {
    pub(crate) registry: ComponentTypeRegistry,
    pub(crate) entity_index: EntityIndex,
    chunk_tables: HashMap<u16, Box<dyn ErasedChunkTable>>,
    managed_components: HashMap<u16, HashMap<u32, Box<dyn Any>>>,
    pub(crate) metadata_table: MetadataTable,
    pub(crate) event_bus: EventBus,
    phase_machine: PhaseMachine,
    pub(crate) global_version: u32,
    destruction_log: Vec<(u32, u16)>,
    singletons: HashMap<std::any::TypeId, Box<dyn Any>>,
    config: EcsConfig,
}

impl EntityRepository {
    pub fn new(config: EcsConfig) -> EcsResult<Self> {
        let entity_index = EntityIndex::new(config.chunk_size_bytes, config.initial_reservation_bytes)?;
        Ok(Self {
            registry: ComponentTypeRegistry::new(),
            entity_index,
            chunk_tables: HashMap::new(),
            managed_components: HashMap::new(),
            metadata_table: MetadataTable::new(),
            event_bus: EventBus::new(),
            phase_machine: PhaseMachine::new(PhaseConfig::default_strict(), "Initialization"),
            global_version: 0,
            destruction_log: Vec::new(),
            singletons: HashMap::new(),
            config,
        })
    }

    pub fn with_phase_config(mut self, config: PhaseConfig, initial_phase: &str) -> Self {
        self.phase_machine = PhaseMachine::new(config, initial_phase);
        self
    }

    pub fn global_version(&self) -> u32 {
        self.global_version
    }

    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    pub fn set_phase(&mut self, phase: &str) -> EcsResult<()> {
        self.phase_machine.set_phase(phase)
    }

    pub fn current_phase(&self) -> &str {
        self.phase_machine.current()
    }

    /// `global_version += 1`. The delta protocol requires writes to happen
    /// strictly after `tick()` and before the next `capture_frame` with
    /// `base_tick = previous tick` — this is a
    /// documented calling-convention requirement, not enforced here.
    pub fn tick(&mut self) {
        self.global_version += 1;
    }

    // ---- component type registration ----------------------------------

    /// Registers `T` as an unmanaged (POD, chunk-stored) component.
    pub fn register_component<T: Copy + 'static>(
        &mut self,
        name: &str,
        snapshotable: Option<bool>,
    ) -> EcsResult<u16> {
        let id = self.registry.register::<T>(
            name,
            std::mem::size_of::<T>(),
            false,
            snapshotable.unwrap_or(true),
            self.config.max_component_types,
        )?;
        self.chunk_tables.entry(id).or_insert_with(|| {
            Box::new(
                ChunkTable::<T>::new(self.config.chunk_size_bytes, self.config.initial_reservation_bytes)
                    .expect("chunk table reservation"),
            ) as Box<dyn ErasedChunkTable>
        });
        Ok(id)
    }

    /// Registers `T` as a managed component. `T` must implement
    /// [`Transient`] — the Rust analogue of the `[Transient]` marker
    /// attribute the source requires before a non-record type may be
    /// snapshotted.
    pub fn register_managed_component<T: Transient>(
        &mut self,
        name: &str,
        snapshotable: Option<bool>,
    ) -> EcsResult<u16> {
        let id = self.registry.register::<T>(
            name,
            0,
            true,
            snapshotable.unwrap_or(true),
            self.config.max_component_types,
        )?;
        self.managed_components.entry(id).or_default();
        Ok(id)
    }

    /// Dynamic counterpart used by scenarios that register managed
    /// components without a compile-time `Transient` bound (e.g. loading a
    /// schema at runtime). Fails loudly when `is_transient_marker` is false.
    pub fn register_managed_component_dynamic<T: 'static>(
        &mut self,
        name: &str,
        is_transient_marker: bool,
        snapshotable: Option<bool>,
    ) -> EcsResult<u16> {
        if !is_transient_marker {
            return Err(EcsError::MisconfigurationError {
                type_id: name.to_string(),
                guidance: format!(
                    "managed component '{name}' has no Transient marker; mutable reference \
                     types cannot be safely snapshotted without explicit opt-in — convert it \
                     to an immutable record or implement Transient for it"
                ),
            });
        }
        let id = self.registry.register::<T>(
            name,
            0,
            true,
            snapshotable.unwrap_or(true),
            self.config.max_component_types,
        )?;
        self.managed_components.entry(id).or_default();
        Ok(id)
    }

    // ---- entity lifecycle ------------------------------------------------

    pub fn create_entity(&mut self) -> EcsResult<Entity> {
        self.entity_index.create_entity(self.global_version)
    }

    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        self.entity_index.destroy_entity(entity, self.global_version)?;
        self.destruction_log.push((entity.index, entity.generation));
        for managed in self.managed_components.values_mut() {
            managed.remove(&entity.index);
        }
        self.metadata_table.clear_entity(entity.index);
        Ok(())
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entity_index.is_alive(entity)
    }

    pub fn entity_generation(&self, slot: u32) -> EcsResult<u16> {
        Ok(self.entity_index.get_header(slot)?.generation)
    }

    pub fn get_destruction_log(&self) -> &[(u32, u16)] {
        &self.destruction_log
    }

    pub fn clear_destruction_log(&mut self) {
        self.destruction_log.clear();
    }

    /// Forces activation of a specific slot; used by replay and test
    /// scaffolds, bypassing the free list.
    pub fn hydrate_entity(&mut self, slot: u32, generation: u16) -> EcsResult<Entity> {
        let mask = self
            .entity_index
            .get_header(slot)
            .map(|h| h.component_mask)
            .unwrap_or_default();
        self.entity_index
            .force_restore_entity(slot, true, generation, mask)?;
        Ok(Entity::new(slot, generation))
    }

    // ---- component access -------------------------------------------------

    fn require_alive(&self, entity: Entity) -> EcsResult<()> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity {
                index: entity.index,
                generation: entity.generation,
            })
        }
    }

    fn has_authority<T: 'static>(&self, entity: Entity) -> EcsResult<bool> {
        let id = self.registry.id_of::<T>()?;
        Ok(self
            .entity_index
            .get_header(entity.index)
            .map(|h| h.authority_mask.get(id))
            .unwrap_or(false))
    }

    pub fn set_authority<T: 'static>(&mut self, entity: Entity, owned: bool) -> EcsResult<()> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        let header = self
            .entity_index
            .get_header_mut_and_touch(entity.index, self.global_version)?;
        if owned {
            header.authority_mask.set(id);
        } else {
            header.authority_mask.clear_bit(id);
        }
        Ok(())
    }

    fn chunk_table<T: Copy + 'static>(&self, id: u16) -> EcsResult<&ChunkTable<T>> {
        self.chunk_tables
            .get(&id)
            .and_then(|t| t.as_any().downcast_ref::<ChunkTable<T>>())
            .ok_or_else(|| EcsError::NotRegistered(std::any::type_name::<T>().to_string()))
    }

    fn chunk_table_mut<T: Copy + 'static>(&mut self, id: u16) -> EcsResult<&mut ChunkTable<T>> {
        self.chunk_tables
            .get_mut(&id)
            .and_then(|t| t.as_any_mut().downcast_mut::<ChunkTable<T>>())
            .ok_or_else(|| EcsError::NotRegistered(std::any::type_name::<T>().to_string()))
    }

    /// Under `config.paranoid_mode`, re-checks the invariant that a chunk's
    /// version stamp never lags behind the header version of an entity it
    /// just stored data for. A no-op otherwise — this walks a chunk table on
    /// every touch, too expensive to run unconditionally.
    fn paranoid_check_chunk_monotonic<T: Copy + 'static>(
        &self,
        id: u16,
        entity_index: u32,
    ) -> EcsResult<()> {
        if !self.config.paranoid_mode {
            return Ok(());
        }
        let table = self.chunk_table::<T>(id)?;
        let chunk_idx = entity_index as usize / table.capacity_per_chunk();
        let header_version = self.entity_index.get_header(entity_index)?.version;
        debug_assert!(
            table.chunk_version(chunk_idx) >= header_version,
            "chunk {chunk_idx} version {} behind header version {header_version}",
            table.chunk_version(chunk_idx)
        );
        Ok(())
    }

    pub fn add_component<T: Copy + 'static>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        let has_authority = self.has_authority::<T>(entity)?;
        self.phase_machine
            .check_write(&self.registry.info(id).unwrap().name.clone(), has_authority)?;
        let version = self.global_version;
        *self.chunk_table_mut::<T>(id)?.get_mut_and_touch(entity.index, version)? = value;
        let header = self
            .entity_index
            .get_header_mut_and_touch(entity.index, version)?;
        header.component_mask.set(id);
        header.version = version;
        self.paranoid_check_chunk_monotonic::<T>(id, entity.index)?;
        Ok(())
    }

    pub fn remove_component<T: Copy + 'static>(&mut self, entity: Entity) -> EcsResult<()> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        let has_authority = self.has_authority::<T>(entity)?;
        self.phase_machine
            .check_write(&self.registry.info(id).unwrap().name.clone(), has_authority)?;
        let version = self.global_version;
        let header = self
            .entity_index
            .get_header_mut_and_touch(entity.index, version)?;
        header.component_mask.clear_bit(id);
        header.version = version;
        Ok(())
    }

    pub fn get_ro<T: Copy + 'static>(&self, entity: Entity) -> EcsResult<T> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        self.phase_machine
            .check_read(&self.registry.info(id).unwrap().name.clone())?;
        let header = self.entity_index.get_header(entity.index)?;
        if !header.component_mask.get(id) {
            return Err(EcsError::NoSuchComponent {
                index: entity.index,
                generation: entity.generation,
                type_id: self.registry.info(id).unwrap().name.clone(),
            });
        }
        Ok(*self.chunk_table::<T>(id)?.get_ref(entity.index)?)
    }

    pub fn get_rw<T: Copy + 'static>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        {
            let header = self.entity_index.get_header(entity.index)?;
            if !header.component_mask.get(id) {
                return Err(EcsError::NoSuchComponent {
                    index: entity.index,
                    generation: entity.generation,
                    type_id: self.registry.info(id).unwrap().name.clone(),
                });
            }
        }
        let has_authority = self.has_authority::<T>(entity)?;
        self.phase_machine
            .check_write(&self.registry.info(id).unwrap().name.clone(), has_authority)?;
        let version = self.global_version;
        self.chunk_table_mut::<T>(id)?.touch(entity.index, version);
        self.entity_index
            .get_header_mut_and_touch(entity.index, version)?
            .version = version;
        self.paranoid_check_chunk_monotonic::<T>(id, entity.index)?;
        self.chunk_table_mut::<T>(id)?.get_mut_and_touch(entity.index, version)
    }

    pub fn set<T: Copy + 'static>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        {
            let header = self.entity_index.get_header(entity.index)?;
            if !header.component_mask.get(id) {
                return Err(EcsError::NoSuchComponent {
                    index: entity.index,
                    generation: entity.generation,
                    type_id: self.registry.info(id).unwrap().name.clone(),
                });
            }
        }
        let has_authority = self.has_authority::<T>(entity)?;
        self.phase_machine
            .check_write(&self.registry.info(id).unwrap().name.clone(), has_authority)?;
        let version = self.global_version;
        *self.chunk_table_mut::<T>(id)?.get_mut_and_touch(entity.index, version)? = value;
        let header = self
            .entity_index
            .get_header_mut_and_touch(entity.index, version)?;
        header.version = version;
        self.paranoid_check_chunk_monotonic::<T>(id, entity.index)?;
        Ok(())
    }

    // ---- managed components ------------------------------------------------

    pub fn add_managed_component<T: Transient>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        let has_authority = self.has_authority::<T>(entity)?;
        self.phase_machine
            .check_write(&self.registry.info(id).unwrap().name.clone(), has_authority)?;
        let version = self.global_version;
        self.managed_components
            .get_mut(&id)
            .ok_or_else(|| EcsError::NotRegistered(std::any::type_name::<T>().to_string()))?
            .insert(entity.index, Box::new(value));
        let header = self
            .entity_index
            .get_header_mut_and_touch(entity.index, version)?;
        header.component_mask.set(id);
        header.version = version;
        Ok(())
    }

    pub fn get_managed_component<T: Transient>(&self, entity: Entity) -> EcsResult<&T> {
        self.require_alive(entity)?;
        let id = self.registry.id_of::<T>()?;
        self.managed_components
            .get(&id)
            .and_then(|m| m.get(&entity.index))
            .and_then(|b| b.downcast_ref::<T>())
            .ok_or_else(|| EcsError::NoSuchComponent {
                index: entity.index,
                generation: entity.generation,
                type_id: self.registry.info(id).unwrap().name.clone(),
            })
    }

    /// Used by the recorder to enumerate managed instances touched since
    /// `base_tick`, and by playback to restore them while also setting the
    /// component mask bit, documented in DESIGN.md.
    pub fn managed_entities_for_type<T: Transient>(&self) -> EcsResult<Vec<u32>> {
        let id = self.registry.id_of::<T>()?;
        Ok(self
            .managed_components
            .get(&id)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default())
    }

    pub fn restore_managed_component<T: Transient>(
        &mut self,
        entity_index: u32,
        generation: u16,
        value: T,
    ) -> EcsResult<()> {
        let id = self.registry.id_of::<T>()?;
        self.managed_components
            .entry(id)
            .or_default()
            .insert(entity_index, Box::new(value));
        // The regression this guards against: restoring managed data
        // without also setting the mask bit leaves the entity invisible to
        // `with::<T>()` queries even though its data round-tripped.
        self.entity_index
            .force_restore_entity(
                entity_index,
                true,
                generation,
                {
                    let mut mask = self
                        .entity_index
                        .get_header(entity_index)
                        .map(|h| h.component_mask)
                        .unwrap_or_default();
                    mask.set(id);
                    mask
                },
            )
    }

    // ---- singletons -----------------------------------------------------

    pub fn get_singleton_unmanaged<T: Default + 'static>(&mut self) -> &mut T {
        self.singletons
            .entry(std::any::TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("singleton type map is keyed by TypeId")
    }

    // ---- recorder-facing access --------------------------------------------
    //
    // The flight recorder lives in the sibling `ecs-recorder` crate and
    // cannot reach private fields, so every primitive it needs (chunk
    // iteration, raw chunk copy/restore, managed enumeration) is exposed
    // here explicitly rather than handing out `&EntityIndex`/`&ChunkTable`.

    pub fn component_type_id<T: 'static>(&self) -> EcsResult<u16> {
        self.registry.id_of::<T>()
    }

    pub fn component_info(&self, type_id: u16) -> Option<crate::types::ComponentTypeInfo> {
        self.registry.info(type_id).cloned()
    }

    pub fn snapshotable_type_ids(&self) -> Vec<u16> {
        self.registry.snapshotable_ids().collect()
    }

    pub fn header_chunk_count(&self) -> usize {
        self.entity_index.chunk_count()
    }

    pub fn header_capacity_per_chunk(&self) -> usize {
        self.entity_index.capacity_per_chunk()
    }

    pub fn header_chunk_version(&self, chunk_idx: usize) -> u32 {
        self.entity_index.header_chunk_version(chunk_idx)
    }

    pub fn header_chunk_committed(&self, chunk_idx: usize) -> bool {
        self.entity_index.header_chunk_committed(chunk_idx)
    }

    pub fn copy_header_chunk(&self, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize> {
        self.entity_index.copy_header_chunk(chunk_idx, out)
    }

    pub fn restore_header_chunk(&mut self, chunk_idx: usize, buf: &[u8]) -> EcsResult<()> {
        self.entity_index.restore_header_chunk(chunk_idx, buf)
    }

    pub fn chunk_liveness(&self, chunk_idx: usize) -> Vec<bool> {
        self.entity_index.chunk_liveness(chunk_idx)
    }

    /// Liveness over an arbitrary absolute entity-index range, independent
    /// of the entity header's own chunk capacity. Used to sanitize
    /// component chunks, whose capacity-per-chunk differs per type from
    /// the header's.
    pub fn liveness_for_range(&self, start_index: u32, count: usize) -> Vec<bool> {
        (0..count)
            .map(|offset| {
                self.entity_index
                    .get_header(start_index + offset as u32)
                    .map(|h| h.active)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn clear_entity_index(&mut self) -> EcsResult<()> {
        self.entity_index.clear()
    }

    pub fn rebuild_after_restore(&mut self) -> EcsResult<()> {
        self.entity_index.rebuild_metadata()
    }

    pub fn set_global_version(&mut self, version: u32) {
        self.global_version = version;
    }

    pub fn component_chunk_count<T: Copy + 'static>(&self) -> EcsResult<usize> {
        let id = self.registry.id_of::<T>()?;
        Ok(self.chunk_table::<T>(id)?.chunk_count())
    }

    pub fn component_capacity_per_chunk<T: Copy + 'static>(&self) -> EcsResult<usize> {
        let id = self.registry.id_of::<T>()?;
        Ok(self.chunk_table::<T>(id)?.capacity_per_chunk())
    }

    pub fn component_chunk_version<T: Copy + 'static>(&self, chunk_idx: usize) -> EcsResult<u32> {
        let id = self.registry.id_of::<T>()?;
        Ok(self.chunk_table::<T>(id)?.chunk_version(chunk_idx))
    }

    pub fn component_chunk_committed<T: Copy + 'static>(&self, chunk_idx: usize) -> EcsResult<bool> {
        let id = self.registry.id_of::<T>()?;
        Ok(self.chunk_table::<T>(id)?.is_chunk_committed(chunk_idx))
    }

    pub fn copy_component_chunk<T: Copy + 'static>(
        &self,
        chunk_idx: usize,
        out: &mut [u8],
    ) -> EcsResult<usize> {
        let id = self.registry.id_of::<T>()?;
        self.chunk_table::<T>(id)?.copy_chunk_to_buffer(chunk_idx, out)
    }

    pub fn restore_component_chunk<T: Copy + 'static>(
        &mut self,
        chunk_idx: usize,
        buf: &[u8],
    ) -> EcsResult<()> {
        let id = self.registry.id_of::<T>()?;
        self.chunk_table_mut::<T>(id)?
            .restore_chunk_from_buffer(chunk_idx, buf)
    }

    pub fn sanitize_component_chunk<T: Copy + 'static>(
        &mut self,
        chunk_idx: usize,
        liveness: &[bool],
    ) -> EcsResult<()> {
        let id = self.registry.id_of::<T>()?;
        self.chunk_table_mut::<T>(id)?.sanitize_chunk(chunk_idx, liveness)
    }

    /// Entities whose managed `T` has an entity-header version beyond
    /// `base_tick` (delta gating for the managed-components frame section).
    /// `every_entity` bypasses the version filter entirely, the same way a
    /// keyframe's chunk writers ignore chunk versions.
    pub fn managed_entities_for_type_since<T: Transient>(
        &self,
        base_tick: u32,
        every_entity: bool,
    ) -> EcsResult<Vec<u32>> {
        let entities = self.managed_entities_for_type::<T>()?;
        if every_entity {
            return Ok(entities);
        }
        Ok(entities
            .into_iter()
            .filter(|&idx| {
                self.entity_index
                    .get_header(idx)
                    .map(|h| h.version > base_tick)
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn publish_event<T: Copy + 'static>(&mut self, value: T) {
        self.event_bus.publish(value);
    }

    pub fn consume_events<T: Copy + 'static>(&self) -> EcsResult<&[T]> {
        self.event_bus.consume::<T>()
    }

    pub fn publish_managed_event<T: 'static>(&mut self, bytes: Vec<u8>) {
        self.event_bus.publish_managed::<T>(bytes);
    }

    pub fn consume_managed_events<T: 'static>(&self) -> &[Vec<u8>] {
        self.event_bus.consume_managed::<T>()
    }

    pub fn swap_event_buffers(&mut self) {
        self.event_bus.swap_buffers();
    }

    pub fn register_event_recorder_id<T: 'static>(&mut self, recorder_type_id: u16) {
        self.event_bus.register_recorder_id::<T>(recorder_type_id);
    }

    pub fn pending_event_streams(&self) -> Vec<(u16, usize, Vec<u8>)> {
        self.event_bus
            .pending_streams_by_recorder_id()
            .into_iter()
            .map(|(id, size, bytes)| (id, size, bytes.to_vec()))
            .collect()
    }

    /// Debug view over every event stream, survives swaps and injections.
    pub fn debug_event_streams(&self) -> Vec<(u64, usize, usize, usize)> {
        self.event_bus
            .debug_inspectors()
            .map(|v| (v.type_id, v.element_size, v.read_buffer.len(), v.write_buffer.len()))
            .collect()
    }

    pub fn inject_event_by_recorder_id(
        &mut self,
        recorder_type_id: u16,
        element_size: usize,
        bytes: &[u8],
    ) -> EcsResult<()> {
        self.event_bus
            .inject_into_current_by_size(recorder_type_id, element_size, bytes)
    }

    // ---- query ------------------------------------------------------------

    pub fn query(&self) -> crate::query::QueryBuilder {
        crate::query::QueryBuilder::new()
    }

    pub fn query_with<T: 'static>(&self, builder: crate::query::QueryBuilder) -> EcsResult<crate::query::QueryBuilder> {
        builder.with::<T>(&self.registry)
    }

    pub fn query_without<T: 'static>(&self, builder: crate::query::QueryBuilder) -> EcsResult<crate::query::QueryBuilder> {
        builder.without::<T>(&self.registry)
    }

    pub fn run_query(&self, builder: crate::query::QueryBuilder) -> crate::query::QueryResults {
        builder.build(&self.entity_index)
    }
}
