//! # genesis_component
//!
//! The primitives of the genesis ECS core: what an entity is, what a
//! component is, and how component data is laid out.
//!
//! This crate provides:
//!
//! - [`Component`] trait and the process-wide [`registry`].
//! - [`Entity`] handles and the [`EntityStore`] that owns their liveness.
//! - [`ArchetypeTable`] - deduplicated component type sets.
//! - [`ComponentStorage`] - dense SoA tables, one per archetype.
//! - [`QueryDescriptor`] - declarative data access requirements for systems.
//! - [`EcsError`] - the shared error taxonomy.

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;
pub mod storage;

pub use archetype::{ArchetypeId, ArchetypeTable};
pub use component::{Component, ComponentMeta, ComponentRecord, ComponentTypeId, ComponentValue};
pub use entity::{Entity, EntityLocation, EntityRef, EntityStore, Placeholder};
pub use error::EcsError;
pub use query::{QueryDescriptor, QueryFilter};
pub use storage::{Column, ColumnData, ComponentStorage, RowMove, Table};
