//! Process-wide component registry.
//!
//! Maps each [`ComponentTypeId`] to its [`ComponentMeta`]. Storage that only
//! knows a type by id (archetype moves, record decoding) dispatches through
//! this table instead of reflecting on Rust types.
//!
//! Registration is idempotent and may happen from any thread. Entries are
//! never removed.

use std::sync::LazyLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::component::{Component, ComponentMeta, ComponentTypeId, ComponentValue};
use crate::error::EcsError;

static REGISTRY: LazyLock<DashMap<ComponentTypeId, ComponentMeta>> = LazyLock::new(DashMap::new);

/// Register `T`, returning its id.
///
/// # Errors
///
/// Returns [`EcsError::ComponentNameCollision`] if a different Rust type was
/// already registered under the same name.
pub fn register<T: Component>() -> Result<ComponentTypeId, EcsError> {
    let id = T::component_type_id();
    match REGISTRY.entry(id) {
        Entry::Occupied(existing) => {
            if existing.get().rust_type == std::any::TypeId::of::<T>() {
                Ok(id)
            } else {
                Err(EcsError::ComponentNameCollision {
                    name: T::type_name(),
                })
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(T::meta());
            Ok(id)
        }
    }
}

/// Look up the metadata for a registered component type.
///
/// # Errors
///
/// Returns [`EcsError::UnregisteredComponent`] if nothing was registered
/// under `id`.
pub fn meta(id: ComponentTypeId) -> Result<ComponentMeta, EcsError> {
    REGISTRY
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or(EcsError::UnregisteredComponent(id))
}

/// Returns the registered name for `id`, if any.
#[must_use]
pub fn name_of(id: ComponentTypeId) -> Option<&'static str> {
    REGISTRY.get(&id).map(|entry| entry.value().name)
}

/// Returns `true` if `id` has been registered.
#[must_use]
pub fn is_registered(id: ComponentTypeId) -> bool {
    REGISTRY.contains_key(&id)
}

/// Check that `value` holds the Rust type registered under its id.
///
/// # Errors
///
/// Returns [`EcsError::UnregisteredComponent`] for an unknown id, or
/// [`EcsError::TypeMismatch`] if another type owns the name.
pub fn check_value(value: &ComponentValue) -> Result<(), EcsError> {
    let id = value.type_id();
    let entry = REGISTRY.get(&id).ok_or(EcsError::UnregisteredComponent(id))?;
    if entry.value().rust_type == value.rust_type() {
        Ok(())
    } else {
        Err(EcsError::TypeMismatch {
            expected: id,
            found: id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Armor(u32);

    impl Component for Armor {
        fn type_name() -> &'static str {
            "registry::Armor"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Impostor(f64);

    impl Component for Impostor {
        // Deliberately claims another type's name.
        fn type_name() -> &'static str {
            "registry::Armor"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NeverRegistered;

    impl Component for NeverRegistered {
        fn type_name() -> &'static str {
            "registry::NeverRegistered"
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let first = register::<Armor>().unwrap();
        let second = register::<Armor>().unwrap();
        assert_eq!(first, second);
        assert!(is_registered(first));
        assert_eq!(name_of(first), Some("registry::Armor"));
    }

    #[test]
    fn test_name_collision_is_rejected() {
        register::<Armor>().unwrap();
        let err = register::<Impostor>().unwrap_err();
        assert!(matches!(
            err,
            EcsError::ComponentNameCollision {
                name: "registry::Armor"
            }
        ));
    }

    #[test]
    fn test_check_value_rejects_name_thief() {
        register::<Armor>().unwrap();
        assert!(check_value(&ComponentValue::new(Armor(3))).is_ok());
        assert!(matches!(
            check_value(&ComponentValue::new(Impostor(1.5))),
            Err(EcsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check_value(&ComponentValue::new(NeverRegistered)),
            Err(EcsError::UnregisteredComponent(_))
        ));
    }

    #[test]
    fn test_meta_of_unregistered_type_fails() {
        let id = NeverRegistered::component_type_id();
        assert!(matches!(meta(id), Err(EcsError::UnregisteredComponent(got)) if got == id));
        assert_eq!(name_of(id), None);
    }
}
