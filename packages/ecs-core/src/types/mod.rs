//! Process-wide component type registry.
//!
//! Maps a Rust type (`TypeId::of::<T>()`) to a dense, monotonically
//! assigned `type_id` plus the metadata the chunk tables and flight
//! recorder need: element size, whether the component is managed (stored
//! outside chunks, serialized through an external codec), and whether it
//! participates in recordings at all.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{EcsError, EcsResult};

#[derive(Debug, Clone)]
pub struct ComponentTypeInfo {
    pub type_id: u16,
    pub name: String,
    pub element_size: usize,
    pub is_managed: bool,
    pub is_snapshotable: bool,
}

#[derive(Debug, Default)]
pub struct ComponentTypeRegistry {
    by_rust_type: HashMap<TypeId, u16>,
    by_id: Vec<ComponentTypeInfo>,
}

impl ComponentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name`. Idempotent: a second call with the same
    /// `(T, element_size, is_managed, is_snapshotable)` returns the existing
    /// id; a call that disagrees on shape is a misconfiguration.
    pub fn register<T: 'static>(
        &mut self,
        name: &str,
        element_size: usize,
        is_managed: bool,
        is_snapshotable: bool,
        max_component_types: usize,
    ) -> EcsResult<u16> {
        let rust_type = TypeId::of::<T>();
        if let Some(&existing_id) = self.by_rust_type.get(&rust_type) {
            let info = &self.by_id[existing_id as usize];
            if info.element_size != element_size || info.is_managed != is_managed {
                return Err(EcsError::MisconfigurationError {
                    type_id: name.to_string(),
                    guidance: "re-registration disagrees with the original registration".into(),
                });
            }
            return Ok(existing_id);
        }

        if self.by_id.len() >= max_component_types {
            return Err(EcsError::CapacityOverflow {
                operation: "component type registration",
            });
        }

        let new_id = self.by_id.len() as u16;
        self.by_id.push(ComponentTypeInfo {
            type_id: new_id,
            name: name.to_string(),
            element_size,
            is_managed,
            is_snapshotable,
        });
        self.by_rust_type.insert(rust_type, new_id);
        Ok(new_id)
    }

    pub fn id_of<T: 'static>(&self) -> EcsResult<u16> {
        self.by_rust_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| EcsError::NotRegistered(std::any::type_name::<T>().to_string()))
    }

    pub fn info(&self, type_id: u16) -> Option<&ComponentTypeInfo> {
        self.by_id.get(type_id as usize)
    }

    pub fn info_of<T: 'static>(&self) -> EcsResult<&ComponentTypeInfo> {
        let id = self.id_of::<T>()?;
        Ok(self.info(id).expect("id_of returned a valid id"))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn snapshotable_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.by_id
            .iter()
            .filter(|info| info.is_snapshotable)
            .map(|info| info.type_id)
    }

    /// Resets the registry. Required for test isolation; concurrent writers
    /// during `clear` are undefined.
    pub fn clear(&mut self) {
        self.by_rust_type.clear();
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position(f32, f32);
    struct Name(String);

    #[test]
    fn register_assigns_dense_monotonic_ids() {
        let mut reg = ComponentTypeRegistry::new();
        let pos_id = reg
            .register::<Position>("Position", 8, false, true, 256)
            .unwrap();
        let name_id = reg
            .register::<Name>("Name", 0, true, true, 256)
            .unwrap();
        assert_eq!(pos_id, 0);
        assert_eq!(name_id, 1);
    }

    #[test]
    fn register_is_idempotent_for_same_shape() {
        let mut reg = ComponentTypeRegistry::new();
        let first = reg
            .register::<Position>("Position", 8, false, true, 256)
            .unwrap();
        let second = reg
            .register::<Position>("Position", 8, false, true, 256)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn id_of_unregistered_type_is_not_registered_error() {
        let reg = ComponentTypeRegistry::new();
        assert!(matches!(
            reg.id_of::<Position>(),
            Err(EcsError::NotRegistered(_))
        ));
    }

    #[test]
    fn clear_allows_re_registration_from_scratch() {
        let mut reg = ComponentTypeRegistry::new();
        reg.register::<Position>("Position", 8, false, true, 256)
            .unwrap();
        reg.clear();
        assert!(reg.is_empty());
        let id = reg
            .register::<Position>("Position", 8, false, true, 256)
            .unwrap();
        assert_eq!(id, 0);
    }
}
