//! ECS error types.

use crate::archetype::ArchetypeId;
use crate::component::ComponentTypeId;
use crate::entity::{Entity, EntityRef, Placeholder};

/// Errors reported by entity, component and command buffer operations.
///
/// Every variant is recoverable. Operations check their preconditions before
/// touching storage, so an error leaves the world as it was.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity handle is stale (its generation no longer matches) or was
    /// never issued.
    #[error("{0} is not alive")]
    InvalidEntity(Entity),

    /// The component type is not part of the entity's archetype.
    #[error("{entity} has no {component} component")]
    MissingComponent {
        /// The entity that was accessed.
        entity: EntityRef,
        /// The component type that was requested.
        component: ComponentTypeId,
    },

    /// The component is already present. Adding twice is a hard error; use a
    /// set or insert operation to overwrite.
    #[error("{entity} already has a {component} component")]
    DuplicateComponent {
        /// The entity that was modified.
        entity: EntityRef,
        /// The component type that was added twice.
        component: ComponentTypeId,
    },

    /// The command buffer was already played back.
    #[error("command buffer has already been played back")]
    AlreadyPlayedBack,

    /// The placeholder belongs to another buffer, or refers to an entity the
    /// buffer has already destroyed.
    #[error("{0} does not refer to a live entity in this buffer")]
    UnknownPlaceholder(Placeholder),

    /// No component type was registered under this id.
    #[error("component type {0} is not registered")]
    UnregisteredComponent(ComponentTypeId),

    /// Two different Rust types claimed the same component name.
    #[error("component name `{name}` is already registered to another type")]
    ComponentNameCollision {
        /// The contested name.
        name: &'static str,
    },

    /// A type-erased value was handed to a column of another type.
    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        /// The column's component type.
        expected: ComponentTypeId,
        /// The value's component type.
        found: ComponentTypeId,
    },

    /// The archetype id does not refer to an allocated table.
    #[error("archetype {0:?} does not exist")]
    InvalidArchetype(ArchetypeId),

    /// The row index is past the end of the archetype's table.
    #[error("row {row} is out of bounds for archetype {archetype:?}")]
    RowOutOfBounds {
        /// The archetype that was accessed.
        archetype: ArchetypeId,
        /// The offending row.
        row: usize,
    },

    /// The command queue's receiving side was dropped.
    #[error("command queue is closed")]
    QueueClosed,

    /// Failed to encode a component to MessagePack.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a component from MessagePack.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl EcsError {
    /// Shorthand for [`EcsError::MissingComponent`].
    #[must_use]
    pub fn missing(entity: impl Into<EntityRef>, component: ComponentTypeId) -> Self {
        Self::MissingComponent {
            entity: entity.into(),
            component,
        }
    }

    /// Shorthand for [`EcsError::DuplicateComponent`].
    #[must_use]
    pub fn duplicate(entity: impl Into<EntityRef>, component: ComponentTypeId) -> Self {
        Self::DuplicateComponent {
            entity: entity.into(),
            component,
        }
    }
}
