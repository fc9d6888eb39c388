//! The [`World`]: the single entry point for creating, mutating and querying
//! entities.
//!
//! Structural changes (create, destroy, add/remove component) take
//! `&mut World`, so they are serialised by the borrow checker. Reads take
//! `&World` and may run on any number of threads at once.
//!
//! Every operation validates the entity handle before touching storage, so a
//! stale handle never corrupts a table.

use tracing::debug;

use genesis_component::{
    ArchetypeId, ArchetypeTable, Component, ComponentRecord, ComponentStorage, ComponentTypeId,
    ComponentValue, EcsError, Entity, EntityLocation, EntityStore, QueryDescriptor, RowMove, Table,
    registry,
};

/// Entities, archetypes and component storage behind one API.
#[derive(Debug, Default)]
pub struct World {
    entities: EntityStore,
    archetypes: ArchetypeTable,
    storage: ComponentStorage,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Entity lifecycle --

    /// Create an entity with no components.
    pub fn create(&mut self) -> Entity {
        let entity = self.entities.create();
        let row = self.storage.push_empty_row(entity);
        self.place(entity, ArchetypeId::EMPTY, row);
        entity
    }

    /// Create an entity directly in the archetype of `values`.
    ///
    /// Cheaper than [`World::create`] followed by one `add_component` per
    /// value, since the entity never visits intermediate archetypes.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if two values share a type,
    /// [`EcsError::UnregisteredComponent`] for an unknown type, or
    /// [`EcsError::TypeMismatch`] for a value whose type borrows a registered
    /// name. No entity or partial row is left behind on failure.
    pub fn spawn(&mut self, values: Vec<ComponentValue>) -> Result<Entity, EcsError> {
        let types: Vec<ComponentTypeId> = values.iter().map(ComponentValue::type_id).collect();
        let archetype = self.get_or_create_archetype(types)?;

        let entity = self.entities.create();
        match self.storage.add_row(archetype, entity, values) {
            Ok(row) => {
                self.place(entity, archetype, row);
                debug!(%entity, ?archetype, "spawned entity");
                Ok(entity)
            }
            Err(err) => {
                // The slot never received a row; releasing it only bumps its
                // generation.
                self.entities.destroy(entity)?;
                Err(err)
            }
        }
    }

    /// Destroy an entity and drop its components.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), EcsError> {
        let location = self.entities.location(entity)?;
        let swapped = self.storage.remove_row(location.archetype, location.row)?;
        if let Some(moved) = swapped {
            self.place(moved, location.archetype, location.row);
        }
        self.entities.destroy(entity)?;
        debug!(%entity, "destroyed entity");
        Ok(())
    }

    /// Returns `true` if `entity` refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    // -- Component operations --

    /// Add a component to an entity, moving it to the wider archetype.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidEntity`] if `entity` is stale.
    /// - [`EcsError::DuplicateComponent`] if the entity already has a `T`.
    /// - [`EcsError::ComponentNameCollision`] if `T`'s name is taken.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        registry::register::<T>()?;
        self.add_value(entity, ComponentValue::new(value))
    }

    /// Overwrite an existing component.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity has no `T`.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        *self.get_component_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Add the component, or overwrite it if already present.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        if self.has_component::<T>(entity) {
            self.set_component(entity, value)
        } else {
            self.add_component(entity, value)
        }
    }

    /// Remove a component and return it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        let value = self.remove_value(entity, T::component_type_id())?;
        value.downcast::<T>().map_err(|value| EcsError::TypeMismatch {
            expected: T::component_type_id(),
            found: value.type_id(),
        })
    }

    /// Borrow an entity's `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] for a stale handle or
    /// [`EcsError::MissingComponent`] if the entity has no `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        let location = self.entities.location(entity)?;
        self.storage.read::<T>(location.archetype, location.row)
    }

    /// Mutably borrow an entity's `T`.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        let location = self.entities.location(entity)?;
        self.storage.write::<T>(location.archetype, location.row)
    }

    /// Returns `true` if `entity` is alive and has a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.entities
            .location(entity)
            .is_ok_and(|loc| self.archetypes.contains(loc.archetype, T::component_type_id()))
    }

    /// The component types attached to `entity`, in canonical order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale.
    pub fn components_of(&self, entity: Entity) -> Result<Vec<ComponentTypeId>, EcsError> {
        let location = self.entities.location(entity)?;
        Ok(self.archetypes.types(location.archetype)?.iter().copied().collect())
    }

    /// Add a type-erased component.
    ///
    /// # Errors
    ///
    /// Same as [`World::add_component`], plus
    /// [`EcsError::UnregisteredComponent`] if the value's type was never
    /// registered and [`EcsError::TypeMismatch`] if another Rust type owns
    /// its name. The entity keeps its row on failure.
    pub fn add_value(&mut self, entity: Entity, value: ComponentValue) -> Result<(), EcsError> {
        let location = self.entities.location(entity)?;
        let component = value.type_id();
        if self.archetypes.contains(location.archetype, component) {
            return Err(EcsError::duplicate(entity, component));
        }
        ensure_registered(component)?;
        let to = self.archetypes.with_added(location.archetype, component)?;
        self.ensure_table(to)?;
        let moved = self
            .storage
            .move_row(location.archetype, location.row, to, vec![value])?;
        self.relocate(entity, location, to, &moved);
        debug!(%entity, %component, ?to, "added component");
        Ok(())
    }

    /// Overwrite a type-erased component.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity lacks the type.
    pub fn set_value(&mut self, entity: Entity, value: ComponentValue) -> Result<(), EcsError> {
        let location = self.entities.location(entity)?;
        self.storage.replace(location.archetype, location.row, value)
    }

    /// Remove a component by type id and return it type-erased.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity lacks the type.
    pub fn remove_value(&mut self, entity: Entity, component: ComponentTypeId) -> Result<ComponentValue, EcsError> {
        let location = self.entities.location(entity)?;
        if !self.archetypes.contains(location.archetype, component) {
            return Err(EcsError::missing(entity, component));
        }
        let to = self.archetypes.with_removed(location.archetype, component)?;
        self.ensure_table(to)?;
        let mut moved = self
            .storage
            .move_row(location.archetype, location.row, to, Vec::new())?;
        self.relocate(entity, location, to, &moved);
        debug!(%entity, %component, ?to, "removed component");
        moved
            .dropped
            .pop()
            .ok_or_else(|| EcsError::missing(entity, component))
    }

    // -- Records --

    /// Encode every component of `entity` as MessagePack records.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] for a stale handle or
    /// [`EcsError::Encode`] if a component fails to serialise.
    pub fn snapshot(&self, entity: Entity) -> Result<Vec<ComponentRecord>, EcsError> {
        let location = self.entities.location(entity)?;
        self.storage.encode_row(location.archetype, location.row)
    }

    /// Create an entity from encoded records, as produced by
    /// [`World::snapshot`] or by an external collaborator.
    ///
    /// Every record's type must already be registered in this process.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponent`], [`EcsError::Decode`] or
    /// [`EcsError::DuplicateComponent`]; nothing is created on failure.
    pub fn spawn_from_records(&mut self, records: &[ComponentRecord]) -> Result<Entity, EcsError> {
        let values = records
            .iter()
            .map(|record| {
                let meta = registry::meta(record.component)?;
                Ok((meta.decode_fn)(&record.data)?)
            })
            .collect::<Result<Vec<_>, EcsError>>()?;
        self.spawn(values)
    }

    // -- Archetypes & queries --

    /// Returns the archetype for a set of component types, allocating its
    /// table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponent`] if a type is unknown.
    pub fn get_or_create_archetype(
        &mut self,
        types: impl IntoIterator<Item = ComponentTypeId>,
    ) -> Result<ArchetypeId, EcsError> {
        let types: Vec<ComponentTypeId> = types.into_iter().collect();
        for &component in &types {
            ensure_registered(component)?;
        }
        let id = self.archetypes.get_or_create(types);
        self.ensure_table(id)?;
        Ok(id)
    }

    /// The archetype `entity` currently belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale.
    pub fn archetype_of(&self, entity: Entity) -> Result<ArchetypeId, EcsError> {
        Ok(self.entities.location(entity)?.archetype)
    }

    /// The storage location of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is stale.
    pub fn location(&self, entity: Entity) -> Result<EntityLocation, EcsError> {
        self.entities.location(entity)
    }

    /// Archetype ids containing every type in `required`.
    #[must_use]
    pub fn matching_archetypes(&self, required: &[ComponentTypeId]) -> Vec<ArchetypeId> {
        self.archetypes.matching(required)
    }

    /// Tables whose archetype satisfies `query`.
    pub fn query_tables<'w>(&'w self, query: &'w QueryDescriptor) -> impl Iterator<Item = &'w Table> + 'w {
        self.archetypes
            .iter()
            .filter(|(_, types)| query.matches(types))
            .filter_map(|(id, _)| self.storage.table(id))
    }

    /// All live entities whose archetype satisfies `query`.
    #[must_use]
    pub fn entities_with(&self, query: &QueryDescriptor) -> Vec<Entity> {
        self.query_tables(query)
            .flat_map(|table| table.entities().iter().copied())
            .collect()
    }

    /// Iterate over every live entity.
    pub fn iter_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns the number of archetypes, including the empty one.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Read-only access to the archetype table.
    #[must_use]
    pub fn archetypes(&self) -> &ArchetypeTable {
        &self.archetypes
    }

    /// Read-only access to component storage.
    #[must_use]
    pub fn storage(&self) -> &ComponentStorage {
        &self.storage
    }

    // -- Internals shared with instantiation --

    pub(crate) fn entity_store_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub(crate) fn storage_mut(&mut self) -> &mut ComponentStorage {
        &mut self.storage
    }

    /// Record `entity`'s row. The entity is known to be alive.
    pub(crate) fn place(&mut self, entity: Entity, archetype: ArchetypeId, row: usize) {
        let result = self
            .entities
            .set_location(entity, EntityLocation { archetype, row });
        debug_assert!(result.is_ok(), "placed a dead entity {entity}");
    }

    fn ensure_table(&mut self, id: ArchetypeId) -> Result<(), EcsError> {
        let types = self.archetypes.types(id)?;
        self.storage.ensure_table(id, types)
    }

    fn relocate(&mut self, entity: Entity, from: EntityLocation, to: ArchetypeId, moved: &RowMove) {
        if let Some(swapped) = moved.swapped {
            self.place(swapped, from.archetype, from.row);
        }
        self.place(entity, to, moved.row);
    }
}

/// Checked before an archetype is created, so no set is left without a table.
fn ensure_registered(component: ComponentTypeId) -> Result<(), EcsError> {
    if registry::is_registered(component) {
        Ok(())
    } else {
        Err(EcsError::UnregisteredComponent(component))
    }
}
