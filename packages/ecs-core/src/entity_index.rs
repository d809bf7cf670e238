//! Dense entity header column, free-list slot recycling, and liveness
//! bookkeeping.

use crate::chunk_table::ChunkTable;
use crate::entity::{Entity, EntityHeader};
use crate::error::EcsResult;

pub struct EntityIndex {
    headers: ChunkTable<EntityHeader>,
    free_list: Vec<u32>,
    /// One past the highest slot index ever allocated.
    high_water: u32,
    active_count: u32,
    chunk_size_bytes: usize,
    reservation_bytes: usize,
}

impl EntityIndex {
    pub fn new(chunk_size_bytes: usize, reservation_bytes: usize) -> EcsResult<Self> {
        Ok(Self {
            headers: ChunkTable::new(chunk_size_bytes, reservation_bytes)?,
            free_list: Vec::new(),
            high_water: 0,
            active_count: 0,
            chunk_size_bytes,
            reservation_bytes,
        })
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    pub fn capacity_per_chunk(&self) -> usize {
        self.headers.capacity_per_chunk()
    }

    pub fn chunk_count(&self) -> usize {
        self.headers.chunk_count()
    }

    /// Reuses the lowest free slot if one exists; otherwise appends.
    pub fn create_entity(&mut self, global_version: u32) -> EcsResult<Entity> {
        if let Some(slot) = self.free_list.pop() {
            let header = self.headers.get_mut_and_touch(slot, global_version)?;
            header.active = true;
            header.version = global_version;
            self.active_count += 1;
            return Ok(Entity::new(slot, header.generation));
        }

        let slot = self.high_water;
        self.high_water += 1;
        let header = self.headers.get_mut_and_touch(slot, global_version)?;
        *header = EntityHeader {
            active: true,
            generation: 0,
            version: global_version,
            ..EntityHeader::default()
        };
        self.active_count += 1;
        Ok(Entity::new(slot, 0))
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        match self.headers.get_ref(entity.index) {
            Ok(header) => header.active && header.generation == entity.generation,
            Err(_) => false,
        }
    }

    pub fn destroy_entity(&mut self, entity: Entity, global_version: u32) -> EcsResult<()> {
        if !self.is_alive(entity) {
            return Err(crate::error::EcsError::DeadEntity {
                index: entity.index,
                generation: entity.generation,
            });
        }
        let header = self.headers.get_mut_and_touch(entity.index, global_version)?;
        header.active = false;
        header.generation = header.generation.wrapping_add(1);
        header.component_mask.clear();
        header.authority_mask.clear();
        header.version = global_version;
        self.active_count -= 1;
        self.free_list.push(entity.index);
        Ok(())
    }

    pub fn get_header(&self, slot: u32) -> EcsResult<&EntityHeader> {
        self.headers.get_ref(slot)
    }

    pub fn get_header_mut_and_touch(
        &mut self,
        slot: u32,
        global_version: u32,
    ) -> EcsResult<&mut EntityHeader> {
        self.headers.get_mut_and_touch(slot, global_version)
    }

    /// Snapshot of `header.active` across one chunk, sized to that chunk's
    /// capacity.
    pub fn chunk_liveness(&self, chunk_idx: usize) -> Vec<bool> {
        let capacity = self.headers.capacity_per_chunk();
        let base = chunk_idx as u32 * capacity as u32;
        (0..capacity as u32)
            .map(|i| {
                self.headers
                    .get_ref(base + i)
                    .map(|h| h.active)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Used only by playback: overwrites a header slot unconditionally.
    pub fn force_restore_entity(
        &mut self,
        slot: u32,
        active: bool,
        generation: u16,
        component_mask: crate::entity::Bitmap256,
    ) -> EcsResult<()> {
        self.headers.ensure_capacity(slot)?;
        let header = self.headers.get_mut_and_touch(slot, 0)?;
        header.active = active;
        header.generation = generation;
        header.component_mask = component_mask;
        if slot >= self.high_water {
            self.high_water = slot + 1;
        }
        Ok(())
    }

    pub fn restore_header_chunk(&mut self, chunk_idx: usize, buf: &[u8]) -> EcsResult<()> {
        self.headers.restore_chunk_from_buffer(chunk_idx, buf)
    }

    pub fn copy_header_chunk(&self, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize> {
        self.headers.copy_chunk_to_buffer(chunk_idx, out)
    }

    pub fn header_chunk_version(&self, chunk_idx: usize) -> u32 {
        self.headers.chunk_version(chunk_idx)
    }

    pub fn header_chunk_committed(&self, chunk_idx: usize) -> bool {
        self.headers.is_chunk_committed(chunk_idx)
    }

    pub fn clear(&mut self) -> EcsResult<()> {
        *self = Self::new(self.chunk_size_bytes, self.reservation_bytes)?;
        Ok(())
    }

    /// Recomputes `active_count` and the high-water mark after a raw
    /// chunk restore, then rebuilds the free list.
    pub fn rebuild_metadata(&mut self) -> EcsResult<()> {
        let capacity = self.headers.capacity_per_chunk();
        let mut active_count = 0u32;
        let mut highest_active: Option<u32> = None;
        for chunk_idx in 0..self.headers.chunk_count() {
            if !self.headers.is_chunk_committed(chunk_idx) {
                continue;
            }
            for i in 0..capacity as u32 {
                let slot = chunk_idx as u32 * capacity as u32 + i;
                if let Ok(header) = self.headers.get_ref(slot) {
                    if header.active {
                        active_count += 1;
                        highest_active = Some(slot);
                    }
                }
            }
        }
        self.active_count = active_count;
        self.high_water = highest_active.map(|s| s + 1).unwrap_or(0);
        self.rebuild_free_list()
    }

    /// Scans every inactive slot below `high_water` and rebuilds the free
    /// list in ascending order, so the next `create_entity` prefers a gap.
    pub fn rebuild_free_list(&mut self) -> EcsResult<()> {
        self.free_list.clear();
        for slot in 0..self.high_water {
            if let Ok(header) = self.headers.get_ref(slot) {
                if !header.active {
                    self.free_list.push(slot);
                }
            }
        }
        // Pop order must hand out the lowest gap first.
        self.free_list.reverse();
        Ok(())
    }
}
