//! Per-component-type chunked column store.
//!
//! Each `ChunkTable<T>` owns one reserved virtual region sized by
//! `EcsConfig::initial_reservation_bytes`, split into fixed `chunk_size_bytes`
//! chunks. Chunk 0 covers slots `[0, capacity)`, chunk `k` covers
//! `[k*capacity, (k+1)*capacity)`. Chunks commit physical pages lazily on
//! first write and can be decommitted when empty.

use std::any::Any;
use std::marker::PhantomData;
use std::mem::size_of;

use crate::alloc::VirtualRegion;
use crate::error::{EcsError, EcsResult};

/// Per-chunk bookkeeping. `version` is the global version of the most
/// recent write into this chunk; `chunk.version >= max(header.version)` for
/// every alive entity in the chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkMeta {
    pub version: u32,
    pub population: u32,
    pub committed: bool,
}

pub struct ChunkTable<T: Copy + 'static> {
    region: VirtualRegion,
    chunk_size_bytes: usize,
    capacity_per_chunk: usize,
    chunks: Vec<ChunkMeta>,
    _marker: PhantomData<T>,
}

impl<T: Copy + 'static> ChunkTable<T> {
    pub fn new(chunk_size_bytes: usize, reservation_bytes: usize) -> EcsResult<Self> {
        let element_size = size_of::<T>();
        if element_size == 0 {
            return Err(EcsError::InvalidArgument(
                "ChunkTable element size must be non-zero".into(),
            ));
        }
        let capacity_per_chunk = chunk_size_bytes / element_size;
        if capacity_per_chunk == 0 {
            return Err(EcsError::InvalidArgument(
                "chunk_size_bytes too small for element size".into(),
            ));
        }
        let region = VirtualRegion::reserve(reservation_bytes)?;
        let chunk_count = region.len() / chunk_size_bytes;
        Ok(Self {
            region,
            chunk_size_bytes,
            capacity_per_chunk,
            chunks: vec![ChunkMeta::default(); chunk_count],
            _marker: PhantomData,
        })
    }

    pub fn capacity_per_chunk(&self) -> usize {
        self.capacity_per_chunk
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn chunk_index_for(&self, slot_index: u32) -> usize {
        slot_index as usize / self.capacity_per_chunk
    }

    fn offset_within_chunk(&self, slot_index: u32) -> usize {
        (slot_index as usize % self.capacity_per_chunk) * size_of::<T>()
    }

    /// Grows committed state so that `slot_index` is addressable, committing
    /// only the chunk that covers it.
    pub fn ensure_capacity(&mut self, slot_index: u32) -> EcsResult<()> {
        let chunk_idx = self.chunk_index_for(slot_index);
        if chunk_idx >= self.chunks.len() {
            return Err(EcsError::OutOfAddressSpace(format!(
                "slot {slot_index} exceeds reserved chunk count {}",
                self.chunks.len()
            )));
        }
        if !self.chunks[chunk_idx].committed {
            self.region
                .commit(chunk_idx * self.chunk_size_bytes, self.chunk_size_bytes)?;
            self.chunks[chunk_idx].committed = true;
            tracing::debug!(chunk_idx, "committed chunk");
        }
        Ok(())
    }

    fn chunk_offset(&self, chunk_idx: usize) -> EcsResult<usize> {
        if chunk_idx >= self.chunks.len() {
            return Err(EcsError::InvalidArgument(format!(
                "chunk index {chunk_idx} out of range"
            )));
        }
        Ok(chunk_idx * self.chunk_size_bytes)
    }

    /// Returns a reference to the element at `slot_index`. Caller must have
    /// already called `ensure_capacity` for this slot.
    pub fn get_ref(&self, slot_index: u32) -> EcsResult<&T> {
        let chunk_idx = self.chunk_index_for(slot_index);
        if chunk_idx >= self.chunks.len() || !self.chunks[chunk_idx].committed {
            return Err(EcsError::InvalidArgument(format!(
                "slot {slot_index} is not committed"
            )));
        }
        let offset = chunk_idx * self.chunk_size_bytes + self.offset_within_chunk(slot_index);
        // SAFETY: `offset` is within the committed chunk (`chunk_size_bytes`
        // bounded above) and properly aligned because chunks start at a
        // 64 KiB boundary and `T: Copy` elements are laid out contiguously.
        Ok(unsafe { &*(self.region.as_ptr().add(offset) as *const T) })
    }

    /// Returns a mutable reference and stamps the owning chunk's version.
    pub fn get_mut_and_touch(&mut self, slot_index: u32, global_version: u32) -> EcsResult<&mut T> {
        self.ensure_capacity(slot_index)?;
        let chunk_idx = self.chunk_index_for(slot_index);
        let offset = chunk_idx * self.chunk_size_bytes + self.offset_within_chunk(slot_index);
        self.chunks[chunk_idx].version = self.chunks[chunk_idx].version.max(global_version);
        // SAFETY: `ensure_capacity` committed this chunk; offset is in
        // range by construction.
        Ok(unsafe { &mut *(self.region.as_ptr().add(offset) as *mut T) })
    }

    pub fn touch(&mut self, slot_index: u32, global_version: u32) {
        let chunk_idx = self.chunk_index_for(slot_index);
        if chunk_idx < self.chunks.len() {
            self.chunks[chunk_idx].version = self.chunks[chunk_idx].version.max(global_version);
        }
    }

    pub fn chunk_version(&self, chunk_idx: usize) -> u32 {
        self.chunks.get(chunk_idx).map(|c| c.version).unwrap_or(0)
    }

    pub fn is_chunk_committed(&self, chunk_idx: usize) -> bool {
        self.chunks.get(chunk_idx).map(|c| c.committed).unwrap_or(false)
    }

    /// Copies the raw bytes of a committed chunk into `out`, returning the
    /// number of bytes written (always `chunk_size_bytes` for a committed
    /// chunk).
    pub fn copy_chunk_to_buffer(&self, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize> {
        let offset = self.chunk_offset(chunk_idx)?;
        if out.len() < self.chunk_size_bytes {
            return Err(EcsError::InvalidArgument(
                "output buffer smaller than chunk_size_bytes".into(),
            ));
        }
        if !self.chunks[chunk_idx].committed {
            out[..self.chunk_size_bytes].fill(0);
            return Ok(self.chunk_size_bytes);
        }
        // SAFETY: `offset + chunk_size_bytes` stays within the reservation
        // because `chunk_offset` validated `chunk_idx` against `chunks.len()`
        // which was sized from `region.len() / chunk_size_bytes`.
        let src = unsafe {
            std::slice::from_raw_parts(self.region.as_ptr().add(offset), self.chunk_size_bytes)
        };
        out[..self.chunk_size_bytes].copy_from_slice(src);
        Ok(self.chunk_size_bytes)
    }

    /// Verbatim restore of chunk bytes from a captured buffer. Commits the
    /// chunk if needed. Caller must call `sanitize_chunk` with an
    /// authoritative liveness bitmap before the first read.
    pub fn restore_chunk_from_buffer(&mut self, chunk_idx: usize, buf: &[u8]) -> EcsResult<()> {
        let offset = self.chunk_offset(chunk_idx)?;
        if buf.len() < self.chunk_size_bytes {
            return Err(EcsError::InvalidArgument(
                "input buffer smaller than chunk_size_bytes".into(),
            ));
        }
        if !self.chunks[chunk_idx].committed {
            self.region.commit(offset, self.chunk_size_bytes)?;
            self.chunks[chunk_idx].committed = true;
        }
        // SAFETY: chunk was just committed (or already was); offset/length
        // bounded by `chunk_size_bytes` as above.
        let dst = unsafe {
            std::slice::from_raw_parts_mut(self.region.as_ptr().add(offset), self.chunk_size_bytes)
        };
        dst.copy_from_slice(&buf[..self.chunk_size_bytes]);
        Ok(())
    }

    /// Zeroes bytes for every slot whose `liveness[i]` is false.
    /// Element-size-agnostic: bounds come from this table's own capacity,
    /// never from the caller's liveness slice length beyond `capacity`.
    pub fn sanitize_chunk(&mut self, chunk_idx: usize, liveness: &[bool]) -> EcsResult<()> {
        let offset = self.chunk_offset(chunk_idx)?;
        if !self.chunks[chunk_idx].committed {
            return Ok(());
        }
        let element_size = size_of::<T>();
        let count = liveness.len().min(self.capacity_per_chunk);
        for (i, &alive) in liveness.iter().take(count).enumerate() {
            if alive {
                continue;
            }
            let elem_offset = offset + i * element_size;
            // SAFETY: `elem_offset + element_size <= offset + chunk_size_bytes`
            // because `i < capacity_per_chunk` and `capacity_per_chunk *
            // element_size <= chunk_size_bytes` by construction in `new`.
            unsafe {
                std::ptr::write_bytes(self.region.as_ptr().add(elem_offset), 0, element_size);
            }
        }
        Ok(())
    }

    pub fn decommit_chunk(&mut self, chunk_idx: usize) -> EcsResult<()> {
        let offset = self.chunk_offset(chunk_idx)?;
        if !self.chunks[chunk_idx].committed {
            return Ok(());
        }
        self.region.decommit(offset, self.chunk_size_bytes)?;
        self.chunks[chunk_idx].committed = false;
        self.chunks[chunk_idx].population = 0;
        tracing::debug!(chunk_idx, "decommitted chunk");
        Ok(())
    }
}

/// Type-erased view over a `ChunkTable<T>` so the repository can hold one
/// column per registered component type in a single map.
pub trait ErasedChunkTable: Any {
    fn ensure_capacity(&mut self, slot_index: u32) -> EcsResult<()>;
    fn touch(&mut self, slot_index: u32, global_version: u32);
    fn chunk_version(&self, chunk_idx: usize) -> u32;
    fn chunk_count(&self) -> usize;
    fn capacity_per_chunk(&self) -> usize;
    fn is_chunk_committed(&self, chunk_idx: usize) -> bool;
    fn copy_chunk_to_buffer(&self, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize>;
    fn restore_chunk_from_buffer(&mut self, chunk_idx: usize, buf: &[u8]) -> EcsResult<()>;
    fn sanitize_chunk(&mut self, chunk_idx: usize, liveness: &[bool]) -> EcsResult<()>;
    fn decommit_chunk(&mut self, chunk_idx: usize) -> EcsResult<()>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Copy + 'static> ErasedChunkTable for ChunkTable<T> {
    fn ensure_capacity(&mut self, slot_index: u32) -> EcsResult<()> {
        ChunkTable::ensure_capacity(self, slot_index)
    }

    fn touch(&mut self, slot_index: u32, global_version: u32) {
        ChunkTable::touch(self, slot_index, global_version)
    }

    fn chunk_version(&self, chunk_idx: usize) -> u32 {
        ChunkTable::chunk_version(self, chunk_idx)
    }

    fn chunk_count(&self) -> usize {
        ChunkTable::chunk_count(self)
    }

    fn capacity_per_chunk(&self) -> usize {
        ChunkTable::capacity_per_chunk(self)
    }

    fn is_chunk_committed(&self, chunk_idx: usize) -> bool {
        ChunkTable::is_chunk_committed(self, chunk_idx)
    }

    fn copy_chunk_to_buffer(&self, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize> {
        ChunkTable::copy_chunk_to_buffer(self, chunk_idx, out)
    }

    fn restore_chunk_from_buffer(&mut self, chunk_idx: usize, buf: &[u8]) -> EcsResult<()> {
        ChunkTable::restore_chunk_from_buffer(self, chunk_idx, buf)
    }

    fn sanitize_chunk(&mut self, chunk_idx: usize, liveness: &[bool]) -> EcsResult<()> {
        ChunkTable::sanitize_chunk(self, chunk_idx, liveness)
    }

    fn decommit_chunk(&mut self, chunk_idx: usize) -> EcsResult<()> {
        ChunkTable::decommit_chunk(self, chunk_idx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
