//! Dense per-archetype component storage.
//!
//! Data is stored in struct-of-arrays layout: every archetype owns one
//! [`Table`], each table holds one [`Column`] per component type plus a
//! parallel vector of entity handles. `entities[i]` corresponds to row `i` in
//! every column.
//!
//! Columns are contiguous `Vec<T>`s hidden behind the [`ColumnData`] trait so
//! a table can hold any mix of component types. Rows are removed with
//! swap-remove to keep every table dense; callers must update the location of
//! the entity that was moved into the freed row.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use crate::archetype::ArchetypeId;
use crate::component::{Component, ComponentRecord, ComponentTypeId, ComponentValue};
use crate::entity::Entity;
use crate::error::EcsError;
use crate::registry;

/// Type-erased operations on a column of components.
///
/// Implemented for `Vec<T>` for every [`Component`] type. Methods that
/// receive another column or a [`ComponentValue`] fail with
/// [`EcsError::TypeMismatch`] rather than panicking when the types differ.
pub trait ColumnData: Send + Sync + 'static {
    /// The component type held by this column.
    fn component_type_id(&self) -> ComponentTypeId;

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `value` holds this column's Rust type.
    fn accepts(&self, value: &ComponentValue) -> bool;

    /// Append a value.
    fn push_value(&mut self, value: ComponentValue) -> Result<(), EcsError>;

    /// Overwrite the value at `row`.
    fn replace_value(&mut self, row: usize, value: ComponentValue) -> Result<(), EcsError>;

    /// Swap-remove the value at `row` and return it.
    fn take_row(&mut self, row: usize) -> ComponentValue;

    /// Swap-remove the value at `row` and append it to `dst`.
    fn move_row(&mut self, row: usize, dst: &mut dyn ColumnData) -> Result<(), EcsError>;

    /// Append `count` clones of the value at `row` to this same column.
    fn extend_from_row(&mut self, row: usize, count: usize);

    /// Encode the value at `row` as MessagePack.
    fn encode_row(&self, row: usize) -> Result<Vec<u8>, EcsError>;

    /// Downcasting hook for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting hook for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ColumnData for Vec<T> {
    fn component_type_id(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn accepts(&self, value: &ComponentValue) -> bool {
        value.downcast_ref::<T>().is_some()
    }

    fn push_value(&mut self, value: ComponentValue) -> Result<(), EcsError> {
        let found = value.type_id();
        let value = value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: T::component_type_id(),
            found,
        })?;
        self.push(value);
        Ok(())
    }

    fn replace_value(&mut self, row: usize, value: ComponentValue) -> Result<(), EcsError> {
        let found = value.type_id();
        let value = value.downcast::<T>().map_err(|_| EcsError::TypeMismatch {
            expected: T::component_type_id(),
            found,
        })?;
        self[row] = value;
        Ok(())
    }

    fn take_row(&mut self, row: usize) -> ComponentValue {
        ComponentValue::new(self.swap_remove(row))
    }

    fn move_row(&mut self, row: usize, dst: &mut dyn ColumnData) -> Result<(), EcsError> {
        let found = dst.component_type_id();
        let dst = dst
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .ok_or(EcsError::TypeMismatch {
                expected: T::component_type_id(),
                found,
            })?;
        dst.push(self.swap_remove(row));
        Ok(())
    }

    fn extend_from_row(&mut self, row: usize, count: usize) {
        let prototype = self[row].clone();
        self.reserve(count);
        self.extend(std::iter::repeat_n(prototype, count));
    }

    fn encode_row(&self, row: usize) -> Result<Vec<u8>, EcsError> {
        Ok(rmp_serde::to_vec_named(&self[row])?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A column in an archetype table, storing components of a single type.
pub struct Column {
    type_id: ComponentTypeId,
    data: Box<dyn ColumnData>,
}

impl Column {
    /// Create an empty column for a registered component type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponent`] if `type_id` is unknown to
    /// the registry.
    pub fn new(type_id: ComponentTypeId) -> Result<Self, EcsError> {
        let meta = registry::meta(type_id)?;
        Ok(Self {
            type_id,
            data: (meta.new_column)(),
        })
    }

    /// The component type stored in this column.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Returns the number of component instances stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if this column contains no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The stored values as a typed slice, if `T` is this column's type.
    #[must_use]
    pub fn as_slice<T: Component>(&self) -> Option<&[T]> {
        self.data.as_any().downcast_ref::<Vec<T>>().map(Vec::as_slice)
    }

    /// The stored values as a mutable typed slice, if `T` is this column's type.
    #[must_use]
    pub fn as_mut_slice<T: Component>(&mut self) -> Option<&mut [T]> {
        self.data
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .map(Vec::as_mut_slice)
    }

    /// Fails with [`EcsError::TypeMismatch`] unless `value` holds the Rust
    /// type stored in this column. Two types registered under one name share
    /// a type id but not a column.
    fn check(&self, value: &ComponentValue) -> Result<(), EcsError> {
        if self.data.accepts(value) {
            Ok(())
        } else {
            Err(EcsError::TypeMismatch {
                expected: self.type_id,
                found: value.type_id(),
            })
        }
    }

    /// Type-erased access to the underlying data.
    #[must_use]
    pub fn data(&self) -> &dyn ColumnData {
        self.data.as_ref()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("type_id", &self.type_id)
            .field("len", &self.len())
            .finish()
    }
}

/// The rows of one archetype.
#[derive(Debug)]
pub struct Table {
    id: ArchetypeId,
    entities: Vec<Entity>,
    /// Sorted by component type id, matching the archetype's canonical set.
    columns: Vec<Column>,
}

impl Table {
    fn new(id: ArchetypeId, types: &BTreeSet<ComponentTypeId>) -> Result<Self, EcsError> {
        let columns = types
            .iter()
            .map(|&type_id| Column::new(type_id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id,
            entities: Vec::new(),
            columns,
        })
    }

    /// The archetype this table stores.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if this table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity handles, indexed by row.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// All columns, sorted by component type id.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns `true` if this table has a column for `type_id`.
    #[must_use]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.column_index(type_id).is_some()
    }

    /// Returns the column for `type_id`, if present.
    #[must_use]
    pub fn column(&self, type_id: ComponentTypeId) -> Option<&Column> {
        self.column_index(type_id).map(|i| &self.columns[i])
    }

    /// Returns the column for `type_id` mutably, if present.
    #[must_use]
    pub fn column_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut Column> {
        self.column_index(type_id).map(|i| &mut self.columns[i])
    }

    fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.columns
            .binary_search_by_key(&type_id, Column::type_id)
            .ok()
    }

    fn entity_at(&self, row: usize) -> Result<Entity, EcsError> {
        self.entities
            .get(row)
            .copied()
            .ok_or(EcsError::RowOutOfBounds {
                archetype: self.id,
                row,
            })
    }

    /// Swap-remove `row` from the entity vector. Returns the entity that now
    /// occupies `row`, if any.
    fn swap_remove_entity(&mut self, row: usize) -> Option<Entity> {
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }
}

/// Result of moving a row between two tables.
#[derive(Debug)]
pub struct RowMove {
    /// The entity's row in the destination table.
    pub row: usize,
    /// The entity moved into the vacated source row, if any.
    pub swapped: Option<Entity>,
    /// Values whose type is not part of the destination archetype.
    pub dropped: Vec<ComponentValue>,
}

/// Owns one [`Table`] per archetype, indexed by [`ArchetypeId`].
#[derive(Debug)]
pub struct ComponentStorage {
    tables: Vec<Option<Table>>,
}

impl ComponentStorage {
    /// Create storage holding the table of the empty archetype.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: vec![Some(Table {
                id: ArchetypeId::EMPTY,
                entities: Vec::new(),
                columns: Vec::new(),
            })],
        }
    }

    /// Create the table for `id` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponent`] if any of `types` is not
    /// registered.
    pub fn ensure_table(&mut self, id: ArchetypeId, types: &BTreeSet<ComponentTypeId>) -> Result<(), EcsError> {
        if self.table(id).is_some() {
            return Ok(());
        }
        let table = Table::new(id, types)?;
        if self.tables.len() <= id.index() {
            self.tables.resize_with(id.index() + 1, || None);
        }
        self.tables[id.index()] = Some(table);
        Ok(())
    }

    /// Returns the table for archetype `id`.
    #[must_use]
    pub fn table(&self, id: ArchetypeId) -> Option<&Table> {
        self.tables.get(id.index()).and_then(Option::as_ref)
    }

    /// Iterate over every allocated table.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().flatten()
    }

    /// Append a row holding `entity` and exactly one value per column.
    ///
    /// Nothing is written unless `values` covers the archetype's columns
    /// exactly.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidArchetype`] if the table does not exist.
    /// - [`EcsError::DuplicateComponent`] if two values share a type.
    /// - [`EcsError::MissingComponent`] if a column has no value, or a value
    ///   has no column.
    /// - [`EcsError::TypeMismatch`] if a value is not its column's Rust type.
    pub fn add_row(&mut self, archetype: ArchetypeId, entity: Entity, values: Vec<ComponentValue>) -> Result<usize, EcsError> {
        let table = self.table_mut(archetype)?;

        let mut seen = BTreeSet::new();
        for value in &values {
            if !seen.insert(value.type_id()) {
                return Err(EcsError::duplicate(entity, value.type_id()));
            }
        }
        if let Some(column) = table.columns.iter().find(|c| !seen.contains(&c.type_id)) {
            return Err(EcsError::missing(entity, column.type_id));
        }
        if let Some(extra) = seen.iter().find(|ty| !table.has_component(**ty)) {
            return Err(EcsError::missing(entity, *extra));
        }
        for value in &values {
            if let Some(column) = table.column(value.type_id()) {
                column.check(value)?;
            }
        }

        for value in values {
            let index = table
                .column_index(value.type_id())
                .ok_or(EcsError::InvalidArchetype(archetype))?;
            table.columns[index].data.push_value(value)?;
        }
        table.entities.push(entity);
        Ok(table.entities.len() - 1)
    }

    /// Append a row for `entity` to the empty archetype's table.
    ///
    /// The empty table has no columns, so this cannot fail.
    pub fn push_empty_row(&mut self, entity: Entity) -> usize {
        if self.tables.is_empty() {
            self.tables.push(None);
        }
        let table = self.tables[0].get_or_insert_with(|| Table {
            id: ArchetypeId::EMPTY,
            entities: Vec::new(),
            columns: Vec::new(),
        });
        table.entities.push(entity);
        table.entities.len() - 1
    }

    /// Swap-remove `row`, dropping its component values.
    ///
    /// Returns the entity whose row index changed, so the caller can update
    /// its recorded location.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidArchetype`] or [`EcsError::RowOutOfBounds`]
    /// before touching any column.
    pub fn remove_row(&mut self, archetype: ArchetypeId, row: usize) -> Result<Option<Entity>, EcsError> {
        let table = self.table_mut(archetype)?;
        table.entity_at(row)?;
        for column in &mut table.columns {
            drop(column.data.take_row(row));
        }
        Ok(table.swap_remove_entity(row))
    }

    /// Move the entity at `row` of `from` into a new row of `to`.
    ///
    /// Values for types present in both archetypes are moved. Types only in
    /// `from` are returned in [`RowMove::dropped`]. Every type only in `to`
    /// must be supplied through `inserted`; a new slot is never left
    /// uninitialised.
    ///
    /// # Errors
    ///
    /// All checks run before any data is moved:
    /// - [`EcsError::InvalidArchetype`] / [`EcsError::RowOutOfBounds`].
    /// - [`EcsError::DuplicateComponent`] if an inserted type already exists
    ///   in `from` or appears twice.
    /// - [`EcsError::MissingComponent`] if a new type has no inserted value,
    ///   or an inserted value has no column in `to`.
    /// - [`EcsError::TypeMismatch`] if an inserted value is not its column's
    ///   Rust type.
    pub fn move_row(
        &mut self,
        from: ArchetypeId,
        row: usize,
        to: ArchetypeId,
        inserted: Vec<ComponentValue>,
    ) -> Result<RowMove, EcsError> {
        let (src, dst) = self.pair_mut(from, to)?;
        let entity = src.entity_at(row)?;

        let mut new_types = BTreeSet::new();
        for value in &inserted {
            let ty = value.type_id();
            if src.has_component(ty) || !new_types.insert(ty) {
                return Err(EcsError::duplicate(entity, ty));
            }
            match dst.column(ty) {
                Some(column) => column.check(value)?,
                None => return Err(EcsError::missing(entity, ty)),
            }
        }
        if let Some(column) = dst
            .columns
            .iter()
            .find(|c| !src.has_component(c.type_id) && !new_types.contains(&c.type_id))
        {
            return Err(EcsError::missing(entity, column.type_id));
        }

        let mut dropped = Vec::new();
        for column in &mut src.columns {
            match dst.column_index(column.type_id) {
                Some(index) => column.data.move_row(row, dst.columns[index].data.as_mut())?,
                None => dropped.push(column.data.take_row(row)),
            }
        }
        for value in inserted {
            let index = dst
                .column_index(value.type_id())
                .ok_or(EcsError::InvalidArchetype(to))?;
            dst.columns[index].data.push_value(value)?;
        }

        dst.entities.push(entity);
        let new_row = dst.entities.len() - 1;
        let swapped = src.swap_remove_entity(row);
        Ok(RowMove {
            row: new_row,
            swapped,
            dropped,
        })
    }

    /// Append one row per entry of `entities`, each a clone of `row`.
    ///
    /// Returns the row index of the first clone; clone `i` lives at
    /// `first + i`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidArchetype`] or [`EcsError::RowOutOfBounds`]
    /// before anything is written.
    pub fn clone_row(&mut self, archetype: ArchetypeId, row: usize, entities: &[Entity]) -> Result<usize, EcsError> {
        let table = self.table_mut(archetype)?;
        table.entity_at(row)?;
        let first = table.entities.len();
        for column in &mut table.columns {
            column.data.extend_from_row(row, entities.len());
        }
        table.entities.extend_from_slice(entities);
        Ok(first)
    }

    /// Borrow the `T` stored at `row`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if `T` is not part of the
    /// archetype, or a lookup error for a bad archetype or row.
    pub fn read<T: Component>(&self, archetype: ArchetypeId, row: usize) -> Result<&T, EcsError> {
        let table = self
            .table(archetype)
            .ok_or(EcsError::InvalidArchetype(archetype))?;
        let entity = table.entity_at(row)?;
        table
            .column(T::component_type_id())
            .and_then(Column::as_slice::<T>)
            .map(|values| &values[row])
            .ok_or_else(|| EcsError::missing(entity, T::component_type_id()))
    }

    /// Mutably borrow the `T` stored at `row`.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStorage::read`].
    pub fn write<T: Component>(&mut self, archetype: ArchetypeId, row: usize) -> Result<&mut T, EcsError> {
        let table = self.table_mut(archetype)?;
        let entity = table.entity_at(row)?;
        table
            .column_mut(T::component_type_id())
            .and_then(Column::as_mut_slice::<T>)
            .map(|values| &mut values[row])
            .ok_or_else(|| EcsError::missing(entity, T::component_type_id()))
    }

    /// Overwrite a value in place without knowing its static type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the value's type is not part
    /// of the archetype, or [`EcsError::TypeMismatch`] if the value is not
    /// the column's Rust type. The stored value is untouched on error.
    pub fn replace(&mut self, archetype: ArchetypeId, row: usize, value: ComponentValue) -> Result<(), EcsError> {
        let table = self.table_mut(archetype)?;
        let entity = table.entity_at(row)?;
        let component = value.type_id();
        let column = table
            .column_mut(component)
            .ok_or(EcsError::MissingComponent {
                entity: entity.into(),
                component,
            })?;
        column.data.replace_value(row, value)
    }

    /// Encode every component of `row` as a [`ComponentRecord`].
    ///
    /// # Errors
    ///
    /// Returns a lookup error for a bad archetype or row, or
    /// [`EcsError::Encode`] if a value fails to serialise.
    pub fn encode_row(&self, archetype: ArchetypeId, row: usize) -> Result<Vec<ComponentRecord>, EcsError> {
        let table = self
            .table(archetype)
            .ok_or(EcsError::InvalidArchetype(archetype))?;
        table.entity_at(row)?;
        table
            .columns
            .iter()
            .map(|column| {
                Ok(ComponentRecord {
                    component: column.type_id,
                    data: column.data.encode_row(row)?,
                })
            })
            .collect()
    }

    fn table_mut(&mut self, id: ArchetypeId) -> Result<&mut Table, EcsError> {
        self.tables
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(EcsError::InvalidArchetype(id))
    }

    fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> Result<(&mut Table, &mut Table), EcsError> {
        if a == b {
            return Err(EcsError::InvalidArchetype(b));
        }
        self.table(a).ok_or(EcsError::InvalidArchetype(a))?;
        self.table(b).ok_or(EcsError::InvalidArchetype(b))?;
        let (ia, ib) = (a.index(), b.index());
        let (first, second) = if ia < ib {
            let (left, right) = self.tables.split_at_mut(ib);
            (&mut left[ia], &mut right[0])
        } else {
            let (left, right) = self.tables.split_at_mut(ia);
            (&mut right[0], &mut left[ib])
        };
        match (first.as_mut(), second.as_mut()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(EcsError::InvalidArchetype(a)),
        }
    }
}

impl Default for ComponentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::archetype::ArchetypeTable;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos(f32, f32);

    impl Component for Pos {
        fn type_name() -> &'static str {
            "storage::Pos"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Label(String);

    impl Component for Label {
        fn type_name() -> &'static str {
            "storage::Label"
        }
    }

    /// Claims `Pos`'s name with a different Rust type. Never registered.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ForgedPos(u8);

    impl Component for ForgedPos {
        fn type_name() -> &'static str {
            "storage::Pos"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ForgedLabel(u8);

    impl Component for ForgedLabel {
        fn type_name() -> &'static str {
            "storage::Label"
        }
    }

    fn assert_dense(storage: &ComponentStorage, id: ArchetypeId) {
        let table = storage.table(id).unwrap();
        for column in table.columns() {
            assert_eq!(column.len(), table.entities().len());
        }
    }

    struct Fixture {
        archetypes: ArchetypeTable,
        storage: ComponentStorage,
        pos: ArchetypeId,
        pos_label: ArchetypeId,
    }

    fn fixture() -> Fixture {
        let pos_id = registry::register::<Pos>().unwrap();
        let label_id = registry::register::<Label>().unwrap();
        let mut archetypes = ArchetypeTable::new();
        let mut storage = ComponentStorage::new();
        let pos = archetypes.get_or_create([pos_id]);
        let pos_label = archetypes.get_or_create([pos_id, label_id]);
        for id in [pos, pos_label] {
            let types = archetypes.types(id).unwrap().clone();
            storage.ensure_table(id, &types).unwrap();
        }
        Fixture {
            archetypes,
            storage,
            pos,
            pos_label,
        }
    }

    fn e(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    #[test]
    fn test_add_row_and_read_write() {
        let mut fx = fixture();
        let row = fx
            .storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(1.0, 2.0))])
            .unwrap();
        assert_eq!(row, 0);
        assert_eq!(fx.storage.read::<Pos>(fx.pos, row).unwrap(), &Pos(1.0, 2.0));

        *fx.storage.write::<Pos>(fx.pos, row).unwrap() = Pos(5.0, 6.0);
        assert_eq!(fx.storage.read::<Pos>(fx.pos, row).unwrap(), &Pos(5.0, 6.0));
    }

    #[test]
    fn test_read_missing_component() {
        let mut fx = fixture();
        let row = fx
            .storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(0.0, 0.0))])
            .unwrap();
        let err = fx.storage.read::<Label>(fx.pos, row).unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { component, .. } if component == Label::component_type_id()));
    }

    #[test]
    fn test_add_row_requires_exact_columns() {
        let mut fx = fixture();
        let missing = fx
            .storage
            .add_row(fx.pos_label, e(0), vec![ComponentValue::new(Pos(0.0, 0.0))]);
        assert!(matches!(missing, Err(EcsError::MissingComponent { .. })));

        let duplicate = fx.storage.add_row(
            fx.pos,
            e(0),
            vec![
                ComponentValue::new(Pos(0.0, 0.0)),
                ComponentValue::new(Pos(1.0, 1.0)),
            ],
        );
        assert!(matches!(duplicate, Err(EcsError::DuplicateComponent { .. })));

        let table = fx.storage.table(fx.pos_label).unwrap();
        assert!(table.is_empty());
        assert!(table.columns().iter().all(Column::is_empty));
    }

    #[test]
    fn test_remove_row_swaps_last_into_hole() {
        let mut fx = fixture();
        for i in 0..3 {
            fx.storage
                .add_row(fx.pos, e(i), vec![ComponentValue::new(Pos(i as f32, 0.0))])
                .unwrap();
        }
        let swapped = fx.storage.remove_row(fx.pos, 0).unwrap();
        assert_eq!(swapped, Some(e(2)));
        assert_eq!(fx.storage.read::<Pos>(fx.pos, 0).unwrap(), &Pos(2.0, 0.0));
        assert_eq!(fx.storage.table(fx.pos).unwrap().entities(), &[e(2), e(1)]);

        // Removing the last row moves nothing.
        assert_eq!(fx.storage.remove_row(fx.pos, 1).unwrap(), None);
        assert!(matches!(
            fx.storage.remove_row(fx.pos, 5),
            Err(EcsError::RowOutOfBounds { row: 5, .. })
        ));
    }

    #[test]
    fn test_move_row_adds_and_drops_columns() {
        let mut fx = fixture();
        fx.storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(1.0, 1.0))])
            .unwrap();
        fx.storage
            .add_row(fx.pos, e(1), vec![ComponentValue::new(Pos(2.0, 2.0))])
            .unwrap();

        let moved = fx
            .storage
            .move_row(
                fx.pos,
                0,
                fx.pos_label,
                vec![ComponentValue::new(Label("a".into()))],
            )
            .unwrap();
        assert_eq!(moved.row, 0);
        assert_eq!(moved.swapped, Some(e(1)));
        assert!(moved.dropped.is_empty());
        assert_eq!(
            fx.storage.read::<Pos>(fx.pos_label, 0).unwrap(),
            &Pos(1.0, 1.0)
        );
        assert_eq!(
            fx.storage.read::<Label>(fx.pos_label, 0).unwrap(),
            &Label("a".into())
        );
        assert_eq!(fx.storage.read::<Pos>(fx.pos, 0).unwrap(), &Pos(2.0, 2.0));

        let back = fx.storage.move_row(fx.pos_label, 0, fx.pos, Vec::new()).unwrap();
        assert_eq!(back.swapped, None);
        assert_eq!(back.dropped.len(), 1);
        let label = back.dropped.into_iter().next().unwrap();
        assert_eq!(label.downcast::<Label>().unwrap(), Label("a".into()));
    }

    #[test]
    fn test_move_row_requires_new_slot_values() {
        let mut fx = fixture();
        fx.storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(1.0, 1.0))])
            .unwrap();
        let err = fx
            .storage
            .move_row(fx.pos, 0, fx.pos_label, Vec::new())
            .unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { component, .. } if component == Label::component_type_id()));
        // Source untouched.
        assert_eq!(fx.storage.table(fx.pos).unwrap().len(), 1);
        assert!(fx.storage.table(fx.pos_label).unwrap().is_empty());
    }

    #[test]
    fn test_clone_row_copies_prototype() {
        let mut fx = fixture();
        fx.storage
            .add_row(
                fx.pos_label,
                e(0),
                vec![
                    ComponentValue::new(Label("proto".into())),
                    ComponentValue::new(Pos(3.0, 4.0)),
                ],
            )
            .unwrap();
        let first = fx
            .storage
            .clone_row(fx.pos_label, 0, &[e(1), e(2), e(3)])
            .unwrap();
        assert_eq!(first, 1);
        let table = fx.storage.table(fx.pos_label).unwrap();
        assert_eq!(table.len(), 4);
        for row in 1..4 {
            assert_eq!(
                fx.storage.read::<Label>(fx.pos_label, row).unwrap(),
                &Label("proto".into())
            );
            assert_eq!(
                fx.storage.read::<Pos>(fx.pos_label, row).unwrap(),
                &Pos(3.0, 4.0)
            );
        }
    }

    #[test]
    fn test_encode_row_produces_one_record_per_column() {
        let mut fx = fixture();
        fx.storage
            .add_row(
                fx.pos_label,
                e(0),
                vec![
                    ComponentValue::new(Pos(3.0, 4.0)),
                    ComponentValue::new(Label("x".into())),
                ],
            )
            .unwrap();
        let records = fx.storage.encode_row(fx.pos_label, 0).unwrap();
        assert_eq!(records.len(), 2);
        let pos: Pos = rmp_serde::from_slice(
            &records
                .iter()
                .find(|r| r.component == Pos::component_type_id())
                .unwrap()
                .data,
        )
        .unwrap();
        assert_eq!(pos, Pos(3.0, 4.0));
    }

    #[test]
    fn test_replace_foreign_type_is_missing() {
        let mut fx = fixture();
        fx.storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(0.0, 0.0))])
            .unwrap();
        let err = fx
            .storage
            .replace(fx.pos, 0, ComponentValue::new(Label("no".into())))
            .unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { .. }));
    }

    #[test]
    fn test_replace_type_mismatch_is_reported() {
        let mut fx = fixture();
        fx.storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(1.0, 2.0))])
            .unwrap();
        let err = fx
            .storage
            .replace(fx.pos, 0, ComponentValue::new(ForgedPos(9)))
            .unwrap_err();
        assert!(matches!(err, EcsError::TypeMismatch { .. }));
        assert_eq!(fx.storage.read::<Pos>(fx.pos, 0).unwrap(), &Pos(1.0, 2.0));
    }

    #[test]
    fn test_add_row_rejects_wrong_rust_type() {
        let mut fx = fixture();
        let err = fx
            .storage
            .add_row(
                fx.pos_label,
                e(0),
                vec![
                    ComponentValue::new(Label("first".into())),
                    ComponentValue::new(ForgedPos(2)),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, EcsError::TypeMismatch { .. }));
        assert!(fx.storage.table(fx.pos_label).unwrap().is_empty());
        assert_dense(&fx.storage, fx.pos_label);

        // The table still accepts well-typed rows afterwards.
        let row = fx
            .storage
            .add_row(
                fx.pos_label,
                e(1),
                vec![
                    ComponentValue::new(Label("second".into())),
                    ComponentValue::new(Pos(3.0, 3.0)),
                ],
            )
            .unwrap();
        assert_eq!(row, 0);
        assert_eq!(
            fx.storage.read::<Label>(fx.pos_label, row).unwrap(),
            &Label("second".into())
        );
        assert_dense(&fx.storage, fx.pos_label);
    }

    #[test]
    fn test_move_row_rejects_wrong_rust_type() {
        let mut fx = fixture();
        fx.storage
            .add_row(fx.pos, e(0), vec![ComponentValue::new(Pos(1.0, 1.0))])
            .unwrap();
        fx.storage
            .add_row(fx.pos, e(1), vec![ComponentValue::new(Pos(2.0, 2.0))])
            .unwrap();

        let err = fx
            .storage
            .move_row(fx.pos, 0, fx.pos_label, vec![ComponentValue::new(ForgedLabel(7))])
            .unwrap_err();
        assert!(matches!(err, EcsError::TypeMismatch { .. }));

        let source = fx.storage.table(fx.pos).unwrap();
        assert_eq!(source.entities(), &[e(0), e(1)]);
        assert_eq!(fx.storage.read::<Pos>(fx.pos, 0).unwrap(), &Pos(1.0, 1.0));
        assert_eq!(fx.storage.read::<Pos>(fx.pos, 1).unwrap(), &Pos(2.0, 2.0));
        assert!(fx.storage.table(fx.pos_label).unwrap().is_empty());
        assert_dense(&fx.storage, fx.pos);
        assert_dense(&fx.storage, fx.pos_label);
    }

    #[test]
    fn test_push_empty_row_appends_to_empty_table() {
        let mut storage = ComponentStorage::new();
        assert_eq!(storage.push_empty_row(e(0)), 0);
        assert_eq!(storage.push_empty_row(e(1)), 1);
        assert_eq!(
            storage.table(ArchetypeId::EMPTY).unwrap().entities(),
            &[e(0), e(1)]
        );
    }
}
