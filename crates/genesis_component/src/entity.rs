//! Entity identifiers and the [`EntityStore`] that owns their liveness.
//!
//! An [`Entity`] is an `(index, generation)` pair. Indices are recycled after
//! destruction; the generation stored at an index is bumped every time the
//! index is freed, so a handle kept across a destroy no longer matches and is
//! reported as stale instead of silently aliasing the new occupant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeId;
use crate::error::EcsError;

/// A generational entity handle.
///
/// Entities carry no data of their own. Components are attached to entities
/// to give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Build a handle from its parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the [`EntityStore`].
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a `u64`: generation in the upper 32 bits, index in the lower.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Entity::to_bits`].
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// A stand-in for an entity that a command buffer will create on playback.
///
/// Placeholders are only meaningful inside the buffer that issued them; the
/// `buffer` field records which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder {
    buffer: u64,
    index: u32,
}

impl Placeholder {
    /// Build a placeholder for the `index`-th creation recorded in `buffer`.
    #[must_use]
    pub const fn new(buffer: u64, index: u32) -> Self {
        Self { buffer, index }
    }

    /// Id of the issuing command buffer.
    #[must_use]
    pub const fn buffer(self) -> u64 {
        self.buffer
    }

    /// Creation order within the issuing buffer.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Placeholder({}#{})", self.buffer, self.index)
    }
}

/// Either a live entity or a placeholder for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// An entity that already exists in the world.
    Entity(Entity),
    /// An entity created earlier in the same command buffer.
    Placeholder(Placeholder),
}

impl From<Entity> for EntityRef {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Placeholder> for EntityRef {
    fn from(placeholder: Placeholder) -> Self {
        Self::Placeholder(placeholder)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(entity) => entity.fmt(f),
            Self::Placeholder(placeholder) => placeholder.fmt(f),
        }
    }
}

/// Where a live entity's components are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype whose table holds the entity.
    pub archetype: ArchetypeId,
    /// Row inside that table.
    pub row: usize,
}

impl EntityLocation {
    /// The location every entity starts at: the empty archetype.
    pub const EMPTY: Self = Self {
        archetype: ArchetypeId::EMPTY,
        row: 0,
    };
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    alive: bool,
    location: EntityLocation,
}

/// Owns entity identities, their generations and their storage locations.
///
/// Freed indices are reused LIFO.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl EntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entity, reusing a freed index when one is available.
    ///
    /// The new entity is placed at [`EntityLocation::EMPTY`]; the caller is
    /// responsible for recording its real row with
    /// [`EntityStore::set_location`].
    pub fn create(&mut self) -> Entity {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            slot.location = EntityLocation::EMPTY;
            return Entity::new(index, slot.generation);
        }

        // Indices are `u32`; a store never holds more than `u32::MAX` slots.
        debug_assert!(
            u32::try_from(self.slots.len()).is_ok(),
            "entity index space exhausted"
        );
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
            location: EntityLocation::EMPTY,
        });
        Entity::new(index, 0)
    }

    /// Free `entity`'s index and bump its generation.
    ///
    /// Returns the location the entity occupied so the caller can release
    /// its storage row.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale or unknown.
    pub fn destroy(&mut self, entity: Entity) -> Result<EntityLocation, EcsError> {
        let slot = self.live_slot_mut(entity)?;
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        let location = slot.location;
        self.free.push(entity.index);
        self.live -= 1;
        Ok(location)
    }

    /// Returns `true` if `entity`'s generation matches the live generation at
    /// its index.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Returns where `entity`'s components live.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale or unknown.
    pub fn location(&self, entity: Entity) -> Result<EntityLocation, EcsError> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.alive && slot.generation == entity.generation)
            .map(|slot| slot.location)
            .ok_or(EcsError::InvalidEntity(entity))
    }

    /// Record a new location for `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale or unknown.
    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) -> Result<(), EcsError> {
        self.live_slot_mut(entity)?.location = location;
        Ok(())
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Reserve room for `additional` more slots.
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional.saturating_sub(self.free.len()));
    }

    /// Iterate over every live entity in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| Entity::new(index as u32, slot.generation))
    }

    fn live_slot_mut(&mut self, entity: Entity) -> Result<&mut Slot, EcsError> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.alive && slot.generation == entity.generation)
            .ok_or(EcsError::InvalidEntity(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_bits_roundtrip() {
        let e = Entity::new(12_345, 67_890);
        assert_eq!(Entity::from_bits(e.to_bits()), e);
        assert_eq!(e.to_bits() >> 32, 67_890);
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(Entity::new(3, 1).to_string(), "Entity(3v1)");
        assert_eq!(Placeholder::new(7, 2).to_string(), "Placeholder(7#2)");
    }

    #[test]
    fn test_store_produces_sequential_indices() {
        let mut store = EntityStore::new();
        let e0 = store.create();
        let e1 = store.create();
        let e2 = store.create();
        assert_eq!((e0.index(), e1.index(), e2.index()), (0, 1, 2));
        assert_eq!(store.len(), 3);
        assert!(store.is_alive(e1));
    }

    #[test]
    fn test_destroy_invalidates_and_reuse_bumps_generation() {
        let mut store = EntityStore::new();
        let old = store.create();
        store.destroy(old).unwrap();
        assert!(!store.is_alive(old));

        let reused = store.create();
        assert_eq!(reused.index(), old.index());
        assert_ne!(reused.generation(), old.generation());
        assert!(store.is_alive(reused));
        assert!(!store.is_alive(old));
    }

    #[test]
    fn test_destroy_stale_entity_fails_without_side_effects() {
        let mut store = EntityStore::new();
        let e = store.create();
        store.destroy(e).unwrap();
        let reused = store.create();

        assert!(matches!(store.destroy(e), Err(EcsError::InvalidEntity(got)) if got == e));
        assert!(store.is_alive(reused));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_index_is_not_alive() {
        let store = EntityStore::new();
        let e = Entity::new(99, 0);
        assert!(!store.is_alive(e));
        assert!(store.location(e).is_err());
    }

    #[test]
    fn test_location_tracking() {
        let mut store = EntityStore::new();
        let e = store.create();
        assert_eq!(store.location(e).unwrap(), EntityLocation::EMPTY);

        let moved = EntityLocation {
            archetype: ArchetypeId(4),
            row: 9,
        };
        store.set_location(e, moved).unwrap();
        assert_eq!(store.location(e).unwrap(), moved);
        assert_eq!(store.destroy(e).unwrap(), moved);
    }

    #[test]
    fn test_iter_skips_dead_slots() {
        let mut store = EntityStore::new();
        let a = store.create();
        let b = store.create();
        let c = store.create();
        store.destroy(b).unwrap();
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = Entity::new(5, 2);
        let bytes = rmp_serde::to_vec(&entity).unwrap();
        let restored: Entity = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(entity, restored);
    }
}
