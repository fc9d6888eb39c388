//! Archetype identities.
//!
//! An archetype is a unique combination of component types. Entities sharing
//! the same set of components are grouped into the same archetype so their
//! data can be stored densely, one table per archetype.
//!
//! [`ArchetypeTable`] deduplicates type sets and hands out dense
//! [`ArchetypeId`]s. It also caches the add/remove transitions between
//! archetypes so repeated `add_component` calls skip the set lookup.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::error::EcsError;

/// Dense archetype identifier, allocated in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    /// The archetype with no components. Always present.
    pub const EMPTY: Self = Self(0);

    /// Position of this archetype in dense per-archetype storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maps canonical component type sets to [`ArchetypeId`]s.
#[derive(Debug)]
pub struct ArchetypeTable {
    /// `sets[id]` is the canonical type set of archetype `id`.
    sets: Vec<BTreeSet<ComponentTypeId>>,
    /// Reverse lookup used for deduplication.
    index: HashMap<BTreeSet<ComponentTypeId>, ArchetypeId>,
    add_edges: HashMap<(ArchetypeId, ComponentTypeId), ArchetypeId>,
    remove_edges: HashMap<(ArchetypeId, ComponentTypeId), ArchetypeId>,
}

impl ArchetypeTable {
    /// Create a table containing only [`ArchetypeId::EMPTY`].
    #[must_use]
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(BTreeSet::new(), ArchetypeId::EMPTY);
        Self {
            sets: vec![BTreeSet::new()],
            index,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    /// Returns the id for this set of types, allocating one if the set is new.
    ///
    /// The order and multiplicity of `types` do not matter.
    pub fn get_or_create(&mut self, types: impl IntoIterator<Item = ComponentTypeId>) -> ArchetypeId {
        let set: BTreeSet<ComponentTypeId> = types.into_iter().collect();
        self.get_or_create_set(set)
    }

    /// Returns the id for `set` without allocating.
    #[must_use]
    pub fn find(&self, set: &BTreeSet<ComponentTypeId>) -> Option<ArchetypeId> {
        self.index.get(set).copied()
    }

    /// Returns the component types of archetype `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidArchetype`] for an id this table never issued.
    pub fn types(&self, id: ArchetypeId) -> Result<&BTreeSet<ComponentTypeId>, EcsError> {
        self.sets
            .get(id.index())
            .ok_or(EcsError::InvalidArchetype(id))
    }

    /// The archetype reached by adding `component` to `from`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidArchetype`] if `from` is unknown.
    pub fn with_added(&mut self, from: ArchetypeId, component: ComponentTypeId) -> Result<ArchetypeId, EcsError> {
        if let Some(&to) = self.add_edges.get(&(from, component)) {
            return Ok(to);
        }
        let mut set = self.types(from)?.clone();
        set.insert(component);
        let to = self.get_or_create_set(set);
        self.add_edges.insert((from, component), to);
        Ok(to)
    }

    /// The archetype reached by removing `component` from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidArchetype`] if `from` is unknown.
    pub fn with_removed(&mut self, from: ArchetypeId, component: ComponentTypeId) -> Result<ArchetypeId, EcsError> {
        if let Some(&to) = self.remove_edges.get(&(from, component)) {
            return Ok(to);
        }
        let mut set = self.types(from)?.clone();
        set.remove(&component);
        let to = self.get_or_create_set(set);
        self.remove_edges.insert((from, component), to);
        Ok(to)
    }

    /// Returns `true` if archetype `id` contains `component`.
    #[must_use]
    pub fn contains(&self, id: ArchetypeId, component: ComponentTypeId) -> bool {
        self.sets
            .get(id.index())
            .is_some_and(|set| set.contains(&component))
    }

    /// Number of archetypes, including the empty one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Always `false`: the empty archetype is created up front.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Iterate over every archetype and its type set.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &BTreeSet<ComponentTypeId>)> {
        self.sets
            .iter()
            .enumerate()
            .map(|(i, set)| (ArchetypeId(i as u32), set))
    }

    /// All archetypes that contain every type in `required`.
    #[must_use]
    pub fn matching(&self, required: &[ComponentTypeId]) -> Vec<ArchetypeId> {
        self.iter()
            .filter(|(_, set)| required.iter().all(|ty| set.contains(ty)))
            .map(|(id, _)| id)
            .collect()
    }

    fn get_or_create_set(&mut self, set: BTreeSet<ComponentTypeId>) -> ArchetypeId {
        if let Some(&id) = self.index.get(&set) {
            return id;
        }
        let id = ArchetypeId(self.sets.len() as u32);
        self.sets.push(set.clone());
        self.index.insert(set, id);
        id
    }
}

impl Default for ArchetypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ComponentTypeId = ComponentTypeId(1);
    const B: ComponentTypeId = ComponentTypeId(2);
    const C: ComponentTypeId = ComponentTypeId(3);

    #[test]
    fn test_empty_archetype_preallocated() {
        let mut table = ArchetypeTable::new();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_or_create([]), ArchetypeId::EMPTY);
        assert!(table.types(ArchetypeId::EMPTY).unwrap().is_empty());
    }

    #[test]
    fn test_get_or_create_deduplicates() {
        let mut table = ArchetypeTable::new();
        let first = table.get_or_create([A, B]);
        let second = table.get_or_create([A, B]);
        assert_eq!(first, second);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_get_or_create_order_independent() {
        let mut table = ArchetypeTable::new();
        let ab = table.get_or_create([A, B]);
        let ba = table.get_or_create([B, A, B]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_edges_resolve_to_canonical_archetypes() {
        let mut table = ArchetypeTable::new();
        let a = table.with_added(ArchetypeId::EMPTY, A).unwrap();
        let ab = table.with_added(a, B).unwrap();
        assert_eq!(ab, table.get_or_create([B, A]));
        assert_eq!(table.with_removed(ab, B).unwrap(), a);
        // Cached edge returns the same answer.
        assert_eq!(table.with_added(a, B).unwrap(), ab);
    }

    #[test]
    fn test_unknown_archetype_is_an_error() {
        let mut table = ArchetypeTable::new();
        assert!(matches!(
            table.with_added(ArchetypeId(42), A),
            Err(EcsError::InvalidArchetype(ArchetypeId(42)))
        ));
        assert!(!table.contains(ArchetypeId(42), A));
    }

    #[test]
    fn test_matching_archetypes() {
        let mut table = ArchetypeTable::new();
        let ab = table.get_or_create([A, B]);
        let a = table.get_or_create([A]);
        let c = table.get_or_create([C]);

        let with_a = table.matching(&[A]);
        assert_eq!(with_a, vec![ab, a]);
        assert_eq!(table.matching(&[A, B]), vec![ab]);
        assert_eq!(table.matching(&[C]), vec![c]);
    }
}
