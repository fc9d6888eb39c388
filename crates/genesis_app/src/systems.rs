//! Demo systems. Each reads the world through its query's tables and
//! records every change into its command buffer.

use glam::Vec3;

use genesis_component::{Column, Component, EcsError, QueryDescriptor, Table};
use genesis_world::{CommandBuffer, World};

use crate::components::{Lifetime, Position, Prototype, Velocity};
use crate::context::SystemContext;
use crate::registry::SystemRegistry;

/// Register the demo systems in their canonical order.
pub fn register_defaults(registry: &mut SystemRegistry, spawn_every: u64) {
    registry.register("movement", movement_query(), movement);
    registry.register("aging", aging_query(), aging);
    registry.register("reaper", reaper_query(), reaper);
    registry.register("spawner", spawner_query(), spawner(spawn_every));
}

fn column<T: Component>(table: &Table) -> Option<&[T]> {
    table
        .column(T::component_type_id())
        .and_then(Column::as_slice::<T>)
}

#[must_use]
pub fn movement_query() -> QueryDescriptor {
    QueryDescriptor::new()
        .with_read::<Velocity>()
        .with_write::<Position>()
        .without::<Prototype>()
}

/// Integrates velocity into position.
pub fn movement(ctx: &SystemContext, world: &World, commands: &mut CommandBuffer) -> Result<(), EcsError> {
    let query = movement_query();
    let dt = ctx.dt_f32();
    for table in world.query_tables(&query) {
        let (Some(positions), Some(velocities)) = (column::<Position>(table), column::<Velocity>(table)) else {
            continue;
        };
        for ((&entity, position), velocity) in table.entities().iter().zip(positions).zip(velocities) {
            if velocity.0 != Vec3::ZERO {
                commands.set_component(entity, Position(position.0 + velocity.0 * dt))?;
            }
        }
    }
    Ok(())
}

#[must_use]
pub fn aging_query() -> QueryDescriptor {
    QueryDescriptor::new()
        .with_write::<Lifetime>()
        .without::<Prototype>()
}

/// Counts lifetimes down by `dt`.
pub fn aging(ctx: &SystemContext, world: &World, commands: &mut CommandBuffer) -> Result<(), EcsError> {
    let query = aging_query();
    let dt = ctx.dt_f32();
    for table in world.query_tables(&query) {
        let Some(lifetimes) = column::<Lifetime>(table) else {
            continue;
        };
        for (&entity, lifetime) in table.entities().iter().zip(lifetimes) {
            commands.set_component(entity, Lifetime {
                remaining: lifetime.remaining - dt,
            })?;
        }
    }
    Ok(())
}

#[must_use]
pub fn reaper_query() -> QueryDescriptor {
    QueryDescriptor::new()
        .with_read::<Lifetime>()
        .without::<Prototype>()
}

/// Destroys entities whose lifetime ran out.
pub fn reaper(_ctx: &SystemContext, world: &World, commands: &mut CommandBuffer) -> Result<(), EcsError> {
    let query = reaper_query();
    for table in world.query_tables(&query) {
        let Some(lifetimes) = column::<Lifetime>(table) else {
            continue;
        };
        for (&entity, lifetime) in table.entities().iter().zip(lifetimes) {
            if lifetime.remaining <= 0.0 {
                commands.destroy_entity(entity)?;
            }
        }
    }
    Ok(())
}

#[must_use]
pub fn spawner_query() -> QueryDescriptor {
    QueryDescriptor::new().with_read::<Prototype>()
}

/// Every `period` ticks, instantiates one untagged copy of each prototype.
pub fn spawner(
    period: u64,
) -> impl Fn(&SystemContext, &World, &mut CommandBuffer) -> Result<(), EcsError> + Send + Sync + 'static {
    move |ctx, world, commands| {
        if !ctx.every(period) {
            return Ok(());
        }
        for prototype in world.entities_with(&spawner_query()) {
            let copy = commands.instantiate(prototype)?;
            commands.remove_component::<Prototype>(copy)?;
        }
        Ok(())
    }
}
