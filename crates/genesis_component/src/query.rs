//! Query descriptors for system data access declarations.
//!
//! A [`QueryDescriptor`] declares which component types a system reads and
//! writes. It is used to match archetypes, and to detect conflicts between
//! systems so that non-conflicting systems can share a stage and read the
//! world concurrently.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId};

/// Describes the data access requirements of a system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Component types the system reads immutably.
    pub reads: Vec<ComponentTypeId>,
    /// Component types the system writes (through deferred commands).
    pub writes: Vec<ComponentTypeId>,
    /// Component types the system may touch when present but does not
    /// require.
    pub optionals: Vec<ComponentTypeId>,
    /// Extra archetype filters.
    pub filters: Vec<QueryFilter>,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only component requirement.
    #[must_use]
    pub fn read(mut self, type_id: ComponentTypeId) -> Self {
        self.reads.push(type_id);
        self
    }

    /// Add a mutable component requirement.
    #[must_use]
    pub fn write(mut self, type_id: ComponentTypeId) -> Self {
        self.writes.push(type_id);
        self
    }

    /// Add an optional component.
    #[must_use]
    pub fn optional(mut self, type_id: ComponentTypeId) -> Self {
        self.optionals.push(type_id);
        self
    }

    /// Add a query filter.
    #[must_use]
    pub fn filter(mut self, f: QueryFilter) -> Self {
        self.filters.push(f);
        self
    }

    /// Typed shorthand for [`QueryDescriptor::read`].
    #[must_use]
    pub fn with_read<T: Component>(self) -> Self {
        self.read(T::component_type_id())
    }

    /// Typed shorthand for [`QueryDescriptor::write`].
    #[must_use]
    pub fn with_write<T: Component>(self) -> Self {
        self.write(T::component_type_id())
    }

    /// Typed shorthand for a [`QueryFilter::Without`] filter.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.filter(QueryFilter::Without(T::component_type_id()))
    }

    /// Returns the set of required component types (reads + writes, excluding optionals).
    #[must_use]
    pub fn required_types(&self) -> Vec<ComponentTypeId> {
        let mut types = Vec::new();
        types.extend_from_slice(&self.reads);
        types.extend_from_slice(&self.writes);
        types
    }

    /// Returns `true` if an archetype with `types` satisfies this query.
    #[must_use]
    pub fn matches(&self, types: &BTreeSet<ComponentTypeId>) -> bool {
        self.required_types().iter().all(|ty| types.contains(ty))
            && self.filters.iter().all(|f| match f {
                QueryFilter::With(ty) => types.contains(ty),
                QueryFilter::Without(ty) => !types.contains(ty),
            })
    }

    /// Checks whether this query conflicts with another.
    ///
    /// Two queries conflict when one writes a component type that the other
    /// reads or writes:
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes ∪ B.optionals) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes ∪ A.optionals) ≠ ∅
    /// ```
    #[must_use]
    pub fn conflicts_with(&self, other: &QueryDescriptor) -> bool {
        let touches = |q: &QueryDescriptor, ty: &ComponentTypeId| {
            q.reads.contains(ty) || q.writes.contains(ty) || q.optionals.contains(ty)
        };
        self.writes.iter().any(|w| touches(other, w)) || other.writes.iter().any(|w| touches(self, w))
    }
}

/// A filter that narrows the set of archetypes matched by a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Only match entities that have this component.
    With(ComponentTypeId),
    /// Only match entities that do NOT have this component.
    Without(ComponentTypeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFORM: ComponentTypeId = ComponentTypeId(1);
    const VELOCITY: ComponentTypeId = ComponentTypeId(2);
    const AI_STATE: ComponentTypeId = ComponentTypeId(3);
    const FROZEN: ComponentTypeId = ComponentTypeId(4);

    #[test]
    fn test_no_conflict_both_read() {
        let q1 = QueryDescriptor::new().read(TRANSFORM);
        let q2 = QueryDescriptor::new().read(TRANSFORM);
        assert!(!q1.conflicts_with(&q2));
    }

    #[test]
    fn test_conflict_read_vs_write() {
        let q1 = QueryDescriptor::new().read(TRANSFORM);
        let q2 = QueryDescriptor::new().write(TRANSFORM);
        assert!(q1.conflicts_with(&q2));
        assert!(q2.conflicts_with(&q1));
    }

    #[test]
    fn test_conflict_write_vs_optional() {
        let q1 = QueryDescriptor::new().optional(VELOCITY);
        let q2 = QueryDescriptor::new().write(VELOCITY);
        assert!(q1.conflicts_with(&q2));
    }

    #[test]
    fn test_disjoint_writers_do_not_conflict() {
        let physics = QueryDescriptor::new().read(TRANSFORM).write(VELOCITY);
        let ai = QueryDescriptor::new().read(TRANSFORM).write(AI_STATE);
        assert!(!physics.conflicts_with(&ai));
    }

    #[test]
    fn test_matches_respects_filters() {
        let q = QueryDescriptor::new()
            .read(VELOCITY)
            .write(TRANSFORM)
            .optional(AI_STATE)
            .filter(QueryFilter::Without(FROZEN));

        let moving: BTreeSet<_> = [TRANSFORM, VELOCITY].into();
        let frozen: BTreeSet<_> = [TRANSFORM, VELOCITY, FROZEN].into();
        let still: BTreeSet<_> = [TRANSFORM].into();

        assert!(q.matches(&moving));
        assert!(!q.matches(&frozen));
        assert!(!q.matches(&still));
    }

    #[test]
    fn test_with_filter_requires_presence() {
        let q = QueryDescriptor::new().filter(QueryFilter::With(FROZEN));
        assert!(q.matches(&[FROZEN].into()));
        assert!(!q.matches(&BTreeSet::new()));
    }
}
