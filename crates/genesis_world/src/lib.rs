//! # genesis_world
//!
//! The world of the genesis ECS core and the ways to populate it:
//!
//! - [`World`]: direct, synchronous entity and component operations.
//! - [`CommandBuffer`]: deferred changes recorded off the mutation thread
//!   and played back atomically.
//! - [`CommandQueue`]: submission-ordered playback of many buffers.
//! - [`World::instantiate`]: bulk copies of a prototype entity.
//! - [`World::snapshot`] / [`World::spawn_from_records`]: MessagePack
//!   records for data-driven creation.

pub mod command;
mod instantiate;
pub mod queue;
pub mod world;

pub use command::CommandBuffer;
pub use queue::{ApplyReport, CommandQueue, CommandSubmitter};
pub use world::World;

pub use genesis_component as component;
