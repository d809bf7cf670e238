//! Type-erased bindings that let the recorder iterate chunk storage for any
//! registered component without `ecs-core` needing to know about the
//! recorder, and without the recorder needing generic parameters threaded
//! through every frame-capture call.

use std::marker::PhantomData;

use ecs_core::repository::{EntityRepository, Transient};
use ecs_core::EcsResult;

use crate::codec::ManagedCodec;
use crate::error::RecorderResult;

/// Binds one `Copy` (unmanaged) component type to its recorder-facing
/// chunk operations.
pub trait UnmanagedBinding {
    fn type_id(&self) -> u16;
    fn chunk_count(&self, repo: &EntityRepository) -> usize;
    fn capacity_per_chunk(&self, repo: &EntityRepository) -> usize;
    fn chunk_version(&self, repo: &EntityRepository, chunk_idx: usize) -> u32;
    fn chunk_committed(&self, repo: &EntityRepository, chunk_idx: usize) -> bool;
    fn copy_chunk(&self, repo: &EntityRepository, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize>;
    fn restore_chunk(&self, repo: &mut EntityRepository, chunk_idx: usize, buf: &[u8]) -> EcsResult<()>;
    fn sanitize_chunk(&self, repo: &mut EntityRepository, chunk_idx: usize, liveness: &[bool]) -> EcsResult<()>;
}

pub struct TypedBinding<T: Copy + 'static> {
    type_id: u16,
    _marker: PhantomData<T>,
}

impl<T: Copy + 'static> TypedBinding<T> {
    pub fn new(repo: &EntityRepository) -> EcsResult<Self> {
        Ok(Self {
            type_id: repo.component_type_id::<T>()?,
            _marker: PhantomData,
        })
    }
}

impl<T: Copy + 'static> UnmanagedBinding for TypedBinding<T> {
    fn type_id(&self) -> u16 {
        self.type_id
    }

    fn chunk_count(&self, repo: &EntityRepository) -> usize {
        repo.component_chunk_count::<T>().unwrap_or(0)
    }

    fn capacity_per_chunk(&self, repo: &EntityRepository) -> usize {
        repo.component_capacity_per_chunk::<T>().unwrap_or(0)
    }

    fn chunk_version(&self, repo: &EntityRepository, chunk_idx: usize) -> u32 {
        repo.component_chunk_version::<T>(chunk_idx).unwrap_or(0)
    }

    fn chunk_committed(&self, repo: &EntityRepository, chunk_idx: usize) -> bool {
        repo.component_chunk_committed::<T>(chunk_idx).unwrap_or(false)
    }

    fn copy_chunk(&self, repo: &EntityRepository, chunk_idx: usize, out: &mut [u8]) -> EcsResult<usize> {
        repo.copy_component_chunk::<T>(chunk_idx, out)
    }

    fn restore_chunk(&self, repo: &mut EntityRepository, chunk_idx: usize, buf: &[u8]) -> EcsResult<()> {
        repo.restore_component_chunk::<T>(chunk_idx, buf)
    }

    fn sanitize_chunk(&self, repo: &mut EntityRepository, chunk_idx: usize, liveness: &[bool]) -> EcsResult<()> {
        repo.sanitize_component_chunk::<T>(chunk_idx, liveness)
    }
}

/// Binds one managed component type to its enumerate/serialize/restore
/// operations, paired with the codec used to turn it into bytes.
pub trait ManagedBinding {
    fn type_id(&self) -> u16;
    fn entities_since(&self, repo: &EntityRepository, base_tick: u32, every_entity: bool) -> Vec<u32>;
    fn serialize_entity(&self, repo: &EntityRepository, entity_index: u32) -> RecorderResult<Vec<u8>>;
    fn restore_entity(
        &self,
        repo: &mut EntityRepository,
        entity_index: u32,
        generation: u16,
        bytes: &[u8],
    ) -> RecorderResult<()>;
}

pub struct TypedManagedBinding<T, C> {
    type_id: u16,
    codec: C,
    _marker: PhantomData<T>,
}

impl<T, C> TypedManagedBinding<T, C>
where
    T: Transient,
    C: ManagedCodec<T>,
{
    pub fn new(repo: &EntityRepository, codec: C) -> EcsResult<Self> {
        Ok(Self {
            type_id: repo.component_type_id::<T>()?,
            codec,
            _marker: PhantomData,
        })
    }
}

impl<T, C> ManagedBinding for TypedManagedBinding<T, C>
where
    T: Transient + Clone,
    C: ManagedCodec<T>,
{
    fn type_id(&self) -> u16 {
        self.type_id
    }

    fn entities_since(&self, repo: &EntityRepository, base_tick: u32, every_entity: bool) -> Vec<u32> {
        repo.managed_entities_for_type_since::<T>(base_tick, every_entity)
            .unwrap_or_default()
    }

    fn serialize_entity(&self, repo: &EntityRepository, entity_index: u32) -> RecorderResult<Vec<u8>> {
        let entity = ecs_core::Entity::new(
            entity_index,
            repo.entity_generation(entity_index).unwrap_or(0),
        );
        let value = repo.get_managed_component::<T>(entity)?;
        self.codec.serialize(value)
    }

    fn restore_entity(
        &self,
        repo: &mut EntityRepository,
        entity_index: u32,
        generation: u16,
        bytes: &[u8],
    ) -> RecorderResult<()> {
        let value = self.codec.deserialize(bytes)?;
        repo.restore_managed_component::<T>(entity_index, generation, value)?;
        Ok(())
    }
}
