//! Core [`Component`] trait and associated metadata.
//!
//! Every piece of data stored in the ECS must implement [`Component`]. The
//! trait requires `Clone` so prototypes can be bulk-copied, and
//! `Send + Sync + 'static` so component data can be read from several worker
//! threads at once.
//!
//! ## Type identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. The id is deterministic across builds and
//! processes, which keeps [`ComponentRecord`]s portable between runs.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::ColumnData;

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        T::component_type_id()
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match crate::registry::name_of(*self) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "ComponentTypeId({:#018x})", self.0),
        }
    }
}

/// Metadata about a component type, used for registry-indexed dispatch.
///
/// Everything the storage layer needs to build a column or decode a record
/// for a type it only knows by [`ComponentTypeId`] lives here.
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    /// The unique type identifier.
    pub type_id: ComponentTypeId,
    /// The human-readable name of the component (e.g. `"Velocity"`).
    pub name: &'static str,
    /// Size and alignment of one component instance.
    pub layout: std::alloc::Layout,
    /// The Rust type backing this id. Used to detect two types claiming the
    /// same name.
    pub rust_type: std::any::TypeId,
    /// Builds an empty column able to hold values of this type.
    pub new_column: fn() -> Box<dyn ColumnData>,
    /// Decodes one MessagePack-encoded instance into a type-erased value.
    pub decode_fn: fn(&[u8]) -> Result<ComponentValue, rmp_serde::decode::Error>,
}

/// The core component trait.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use genesis_component::Component;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Clone + Send + Sync + 'static + Serialize + for<'de> Deserialize<'de> {
    /// A stable, human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }

    /// Returns the [`ComponentMeta`] descriptor for this component type.
    fn meta() -> ComponentMeta {
        ComponentMeta {
            type_id: Self::component_type_id(),
            name: Self::type_name(),
            layout: std::alloc::Layout::new::<Self>(),
            rust_type: std::any::TypeId::of::<Self>(),
            new_column: || Box::new(Vec::<Self>::new()),
            decode_fn: |bytes: &[u8]| {
                let value: Self = rmp_serde::from_slice(bytes)?;
                Ok(ComponentValue::new(value))
            },
        }
    }
}

/// A single component value with its type erased.
///
/// Used wherever a component has to travel without its static type: command
/// buffers, archetype moves and decoded records.
pub struct ComponentValue {
    type_id: ComponentTypeId,
    rust_type: TypeId,
    value: Box<dyn Any + Send + Sync>,
}

impl ComponentValue {
    /// Wrap a typed component.
    #[must_use]
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            type_id: T::component_type_id(),
            rust_type: TypeId::of::<T>(),
            value: Box::new(value),
        }
    }

    /// The component type of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// The Rust type of the wrapped value.
    #[must_use]
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Recover the typed value, or hand the wrapper back on mismatch.
    pub fn downcast<T: Component>(self) -> Result<T, Self> {
        let (type_id, rust_type) = (self.type_id, self.rust_type);
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                type_id,
                rust_type,
                value,
            }),
        }
    }

    /// Borrow the typed value, if `T` is the wrapped type.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentValue")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// One component of one entity, MessagePack-encoded.
///
/// A list of records is the data-driven form of an entity: it can be
/// captured with a snapshot and turned back into a live entity elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// The component type the bytes decode to.
    pub component: ComponentTypeId,
    /// MessagePack-encoded component bytes.
    pub data: Vec<u8>,
}

impl ComponentRecord {
    /// Encode a typed component into a record.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if `value` cannot be serialised.
    pub fn encode<T: Component>(value: &T) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            component: T::component_type_id(),
            data: rmp_serde::to_vec_named(value)?,
        })
    }
}
