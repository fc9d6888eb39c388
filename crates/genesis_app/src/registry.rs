//! System registry: the systems the tick loop runs, in registration order.
//!
//! Registration order matters. Stages are computed over it, and within a
//! stage the systems' command buffers are played back in it.

use std::fmt;

use genesis_component::{EcsError, QueryDescriptor};
use genesis_world::{CommandBuffer, World};

use crate::context::SystemContext;

/// The body of a system. It sees the world read-only and records structural
/// changes into its own buffer.
pub type SystemFn = Box<dyn Fn(&SystemContext, &World, &mut CommandBuffer) -> Result<(), EcsError> + Send + Sync>;

/// A registered system.
pub struct SystemInfo {
    /// The system's human-readable name.
    pub name: String,
    /// The system's data access requirements.
    pub query: QueryDescriptor,
    /// The function run once per tick.
    pub run: SystemFn,
}

impl fmt::Debug for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemInfo")
            .field("name", &self.name)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Registry of all systems known to the tick loop.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    systems: Vec<SystemInfo>,
}

impl SystemRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system. A system with the same name is replaced in place,
    /// keeping its position.
    ///
    /// Returns `true` if the name was new.
    pub fn register<F>(&mut self, name: impl Into<String>, query: QueryDescriptor, run: F) -> bool
    where
        F: Fn(&SystemContext, &World, &mut CommandBuffer) -> Result<(), EcsError> + Send + Sync + 'static,
    {
        let info = SystemInfo {
            name: name.into(),
            query,
            run: Box::new(run),
        };
        match self.systems.iter_mut().find(|s| s.name == info.name) {
            Some(existing) => {
                *existing = info;
                false
            }
            None => {
                self.systems.push(info);
                true
            }
        }
    }

    /// Remove a system by name.
    ///
    /// Returns `true` if the system was found and removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.name != name);
        self.systems.len() != before
    }

    /// Returns a system by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SystemInfo> {
        self.systems.iter().find(|s| s.name == name)
    }

    /// Returns the system at `index` in registration order.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SystemInfo> {
        self.systems.get(index)
    }

    /// Returns an iterator over all registered systems.
    pub fn iter(&self) -> impl Iterator<Item = &SystemInfo> {
        self.systems.iter()
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}
