//! # genesis_app
//!
//! Drives a [`genesis_world::World`] with local systems: a registry of
//! system functions, a scheduler that groups them into conflict-free
//! stages, and a fixed-timestep [`tick::TickLoop`] that runs each stage on
//! scoped threads and plays back the systems' command buffers.

pub mod components;
pub mod context;
pub mod registry;
pub mod scheduler;
pub mod systems;
pub mod tick;
