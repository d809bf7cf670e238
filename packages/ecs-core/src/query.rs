//! Fluent query builder over entity headers.
//!
//! Access is single-threaded per the repository's concurrency model,
//! so this walks headers directly rather than scanning in parallel; the
//! builder collects a required/excluded mask, then produces a restartable,
//! finite lazy sequence over matching entities.

use crate::entity::{Bitmap256, Entity};
use crate::entity_index::EntityIndex;
use crate::error::EcsResult;
use crate::types::ComponentTypeRegistry;

pub struct QueryBuilder {
    required: Bitmap256,
    excluded: Bitmap256,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            required: Bitmap256::new(),
            excluded: Bitmap256::new(),
        }
    }

    pub fn with<T: 'static>(mut self, registry: &ComponentTypeRegistry) -> EcsResult<Self> {
        self.required.set(registry.id_of::<T>()?);
        Ok(self)
    }

    pub fn without<T: 'static>(mut self, registry: &ComponentTypeRegistry) -> EcsResult<Self> {
        self.excluded.set(registry.id_of::<T>()?);
        Ok(self)
    }

    /// Builds a finite, restartable sequence over `index`'s currently
    /// allocated slots (`[0, high_water)`).
    pub fn build(self, index: &EntityIndex) -> QueryResults {
        let mut matches = Vec::new();
        for slot in 0..index.high_water() {
            let Ok(header) = index.get_header(slot) else {
                continue;
            };
            if !header.active {
                continue;
            }
            if !header.component_mask.contains_all(&self.required) {
                continue;
            }
            if !header.component_mask.disjoint_with(&self.excluded) {
                continue;
            }
            matches.push(Entity::new(slot, header.generation));
        }
        QueryResults { matches }
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A realized, restartable query result — `iter()` can be called any
/// number of times.
pub struct QueryResults {
    matches: Vec<Entity>,
}

impl QueryResults {
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.matches.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
