//! Components used by the demo systems.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use genesis_component::Component;

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec3);

impl Component for Position {
    fn type_name() -> &'static str {
        "genesis::Position"
    }
}

/// Units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity(pub Vec3);

impl Component for Velocity {
    fn type_name() -> &'static str {
        "genesis::Velocity"
    }
}

/// Seconds left before the entity is reaped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    pub remaining: f32,
}

impl Component for Lifetime {
    fn type_name() -> &'static str {
        "genesis::Lifetime"
    }
}

/// Marks an entity as a template for the spawner. Prototypes are not
/// simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prototype;

impl Component for Prototype {
    fn type_name() -> &'static str {
        "genesis::Prototype"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);

impl Component for Name {
    fn type_name() -> &'static str {
        "genesis::Name"
    }
}
