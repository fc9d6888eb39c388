//! Prototype instantiation: bulk-copying one entity's row into many new
//! entities of the same archetype.

use tracing::debug;

use genesis_component::{EcsError, Entity};

use crate::world::World;

impl World {
    /// Create `count` entities that are copies of `prototype`.
    ///
    /// The prototype's location is read once. No archetype lookup takes
    /// place: every clone lands in the prototype's table, and every
    /// component value is cloned from the prototype's row as it is at call
    /// time. The prototype itself is left untouched.
    ///
    /// The returned entities are in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `prototype` is not alive.
    pub fn instantiate(&mut self, prototype: Entity, count: usize) -> Result<Vec<Entity>, EcsError> {
        let location = self.location(prototype)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let store = self.entity_store_mut();
        store.reserve(count);
        let clones: Vec<Entity> = (0..count).map(|_| store.create()).collect();

        let first = match self
            .storage_mut()
            .clone_row(location.archetype, location.row, &clones)
        {
            Ok(first) => first,
            Err(err) => {
                for &clone in &clones {
                    self.entity_store_mut().destroy(clone)?;
                }
                return Err(err);
            }
        };

        for (offset, &clone) in clones.iter().enumerate() {
            self.place(clone, location.archetype, first + offset);
        }
        debug!(%prototype, count, archetype = ?location.archetype, "instantiated prototype");
        Ok(clones)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use genesis_component::{Component, ComponentTypeId};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hull {
        integrity: u32,
    }

    impl Component for Hull {
        fn type_name() -> &'static str {
            "instantiate::Hull"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Callsign(String);

    impl Component for Callsign {
        fn type_name() -> &'static str {
            "instantiate::Callsign"
        }
    }

    fn prototype(world: &mut World) -> Entity {
        let proto = world.create();
        world.add_component(proto, Hull { integrity: 80 }).unwrap();
        world
            .add_component(proto, Callsign("alpha".into()))
            .unwrap();
        proto
    }

    #[test]
    fn test_instantiate_copies_values() {
        let mut world = World::new();
        let proto = prototype(&mut world);

        let clones = world.instantiate(proto, 100).unwrap();
        assert_eq!(clones.len(), 100);
        assert_eq!(world.entity_count(), 101);

        let mut unique = clones.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 100);

        let archetype = world.archetype_of(proto).unwrap();
        for &clone in &clones {
            assert!(world.is_alive(clone));
            assert_eq!(world.archetype_of(clone).unwrap(), archetype);
            assert_eq!(world.get_component::<Hull>(clone).unwrap(), &Hull { integrity: 80 });
            assert_eq!(
                world.get_component::<Callsign>(clone).unwrap(),
                &Callsign("alpha".into())
            );
        }
    }

    #[test]
    fn test_clones_are_independent_of_prototype() {
        let mut world = World::new();
        let proto = prototype(&mut world);
        let clones = world.instantiate(proto, 3).unwrap();

        world.get_component_mut::<Hull>(clones[0]).unwrap().integrity = 1;
        world.get_component_mut::<Hull>(proto).unwrap().integrity = 99;

        assert_eq!(world.get_component::<Hull>(clones[0]).unwrap().integrity, 1);
        assert_eq!(world.get_component::<Hull>(clones[1]).unwrap().integrity, 80);
        assert_eq!(world.get_component::<Hull>(proto).unwrap().integrity, 99);
    }

    #[test]
    fn test_instantiate_zero_is_empty() {
        let mut world = World::new();
        let proto = prototype(&mut world);
        assert!(world.instantiate(proto, 0).unwrap().is_empty());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_instantiate_dead_prototype_fails() {
        let mut world = World::new();
        let proto = prototype(&mut world);
        world.destroy(proto).unwrap();
        assert!(matches!(
            world.instantiate(proto, 5),
            Err(EcsError::InvalidEntity(e)) if e == proto
        ));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_instantiate_empty_prototype() {
        let mut world = World::new();
        let proto = world.create();
        let clones = world.instantiate(proto, 4).unwrap();
        for clone in clones {
            assert_eq!(world.components_of(clone).unwrap(), Vec::<ComponentTypeId>::new());
        }
    }

    #[test]
    fn test_destroying_clone_keeps_siblings_valid() {
        let mut world = World::new();
        let proto = prototype(&mut world);
        let clones = world.instantiate(proto, 5).unwrap();
        world.get_component_mut::<Hull>(clones[4]).unwrap().integrity = 7;

        world.destroy(clones[1]).unwrap();
        assert_eq!(world.get_component::<Hull>(clones[4]).unwrap().integrity, 7);
        assert_eq!(world.get_component::<Hull>(proto).unwrap().integrity, 80);
    }
}
