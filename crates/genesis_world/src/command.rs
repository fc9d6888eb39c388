//! Deferred structural changes.
//!
//! A [`CommandBuffer`] records entity and component mutations while the
//! world is shared read-only, and applies them later on the thread that owns
//! `&mut World`. Each producer owns its buffer, so recording needs no
//! synchronisation.
//!
//! Entities created by the buffer are referred to through [`Placeholder`]s
//! until playback resolves them. Playback is all-or-nothing: the whole
//! buffer is checked against the world before the first command is applied.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use genesis_component::{
    Component, ComponentTypeId, ComponentValue, EcsError, Entity, EntityRef, Placeholder, registry,
};

use crate::world::World;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A recorded intent.
#[derive(Debug)]
enum Command {
    Create,
    Instantiate { prototype: EntityRef },
    Add { target: EntityRef, value: ComponentValue },
    Set { target: EntityRef, value: ComponentValue },
    Remove { target: EntityRef, component: ComponentTypeId },
    Destroy { target: EntityRef },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    Recording,
    PlayedBack,
}

/// An append-only batch of structural changes, played back exactly once.
#[derive(Debug)]
pub struct CommandBuffer {
    id: u64,
    commands: Vec<Command>,
    placeholders: u32,
    state: BufferState,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    /// Create an empty buffer with a process-unique id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            commands: Vec::new(),
            placeholders: 0,
            state: BufferState::Recording,
        }
    }

    /// The id stamped into this buffer's placeholders.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns `true` once the buffer has been played back.
    #[must_use]
    pub fn is_played_back(&self) -> bool {
        self.state == BufferState::PlayedBack
    }

    // -- Recording --

    /// Record the creation of an empty entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::AlreadyPlayedBack`] after playback.
    pub fn create_entity(&mut self) -> Result<Placeholder, EcsError> {
        self.ensure_recording()?;
        self.commands.push(Command::Create);
        Ok(self.next_placeholder())
    }

    /// Record a one-off instantiation of `prototype`.
    ///
    /// The prototype may itself be a placeholder of this buffer; it is
    /// copied as it will be at that point of playback.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::AlreadyPlayedBack`] after playback, or
    /// [`EcsError::UnknownPlaceholder`] for a placeholder of another buffer.
    pub fn instantiate(&mut self, prototype: impl Into<EntityRef>) -> Result<Placeholder, EcsError> {
        let prototype = self.check_target(prototype.into())?;
        self.commands.push(Command::Instantiate { prototype });
        Ok(self.next_placeholder())
    }

    /// Record adding `value` to `target`.
    ///
    /// # Errors
    ///
    /// [`EcsError::AlreadyPlayedBack`], [`EcsError::UnknownPlaceholder`] or
    /// [`EcsError::ComponentNameCollision`].
    pub fn add_component<T: Component>(&mut self, target: impl Into<EntityRef>, value: T) -> Result<(), EcsError> {
        let target = self.check_target(target.into())?;
        registry::register::<T>()?;
        self.commands.push(Command::Add {
            target,
            value: ComponentValue::new(value),
        });
        Ok(())
    }

    /// Record overwriting `target`'s existing `T`.
    ///
    /// # Errors
    ///
    /// Same as [`CommandBuffer::add_component`].
    pub fn set_component<T: Component>(&mut self, target: impl Into<EntityRef>, value: T) -> Result<(), EcsError> {
        let target = self.check_target(target.into())?;
        registry::register::<T>()?;
        self.commands.push(Command::Set {
            target,
            value: ComponentValue::new(value),
        });
        Ok(())
    }

    /// Record removing `target`'s `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::AlreadyPlayedBack`] or [`EcsError::UnknownPlaceholder`].
    pub fn remove_component<T: Component>(&mut self, target: impl Into<EntityRef>) -> Result<(), EcsError> {
        let target = self.check_target(target.into())?;
        self.commands.push(Command::Remove {
            target,
            component: T::component_type_id(),
        });
        Ok(())
    }

    /// Record destroying `target`.
    ///
    /// # Errors
    ///
    /// [`EcsError::AlreadyPlayedBack`] or [`EcsError::UnknownPlaceholder`].
    pub fn destroy_entity(&mut self, target: impl Into<EntityRef>) -> Result<(), EcsError> {
        let target = self.check_target(target.into())?;
        self.commands.push(Command::Destroy { target });
        Ok(())
    }

    // -- Playback --

    /// Apply every recorded command to `world`, in recording order.
    ///
    /// Returns the entities created by the buffer, indexed like their
    /// placeholders. An entity created and destroyed by the same buffer is
    /// still listed, but is no longer alive.
    ///
    /// # Errors
    ///
    /// - [`EcsError::AlreadyPlayedBack`] if called a second time.
    /// - Any error the commands would raise against `world`
    ///   ([`EcsError::InvalidEntity`], [`EcsError::MissingComponent`],
    ///   [`EcsError::DuplicateComponent`], [`EcsError::UnknownPlaceholder`]).
    ///   These are found before anything is applied; the world is left
    ///   untouched and the buffer stays in the recording state.
    pub fn playback(&mut self, world: &mut World) -> Result<Vec<Entity>, EcsError> {
        self.ensure_recording()?;
        self.validate(world)?;

        self.state = BufferState::PlayedBack;
        let commands = std::mem::take(&mut self.commands);
        let count = commands.len();
        let mut created = Vec::with_capacity(self.placeholders as usize);

        for command in commands {
            match command {
                Command::Create => created.push(world.create()),
                Command::Instantiate { prototype } => {
                    let prototype = self.resolve(prototype, &created)?;
                    created.extend(world.instantiate(prototype, 1)?);
                }
                Command::Add { target, value } => {
                    world.add_value(self.resolve(target, &created)?, value)?;
                }
                Command::Set { target, value } => {
                    world.set_value(self.resolve(target, &created)?, value)?;
                }
                Command::Remove { target, component } => {
                    world.remove_value(self.resolve(target, &created)?, component)?;
                }
                Command::Destroy { target } => {
                    world.destroy(self.resolve(target, &created)?)?;
                }
            }
        }

        debug!(buffer = self.id, commands = count, created = created.len(), "played back command buffer");
        Ok(created)
    }

    /// Dry-run the buffer against a shadow of `world`'s entity state.
    fn validate(&self, world: &World) -> Result<(), EcsError> {
        let mut shadow: HashMap<EntityRef, Shadow> = HashMap::new();
        let mut next_placeholder = 0;

        for command in &self.commands {
            match command {
                Command::Create => {
                    let placeholder = Placeholder::new(self.id, next_placeholder);
                    next_placeholder += 1;
                    shadow.insert(placeholder.into(), Shadow::alive(BTreeSet::new()));
                }
                Command::Instantiate { prototype } => {
                    let types = live_shadow(&mut shadow, world, *prototype)?.types.clone();
                    let placeholder = Placeholder::new(self.id, next_placeholder);
                    next_placeholder += 1;
                    shadow.insert(placeholder.into(), Shadow::alive(types));
                }
                Command::Add { target, value } => {
                    let component = value.type_id();
                    registry::check_value(value)?;
                    if !live_shadow(&mut shadow, world, *target)?.types.insert(component) {
                        return Err(EcsError::duplicate(*target, component));
                    }
                }
                Command::Set { target, value } => {
                    let component = value.type_id();
                    registry::check_value(value)?;
                    if !live_shadow(&mut shadow, world, *target)?.types.contains(&component) {
                        return Err(EcsError::missing(*target, component));
                    }
                }
                Command::Remove { target, component } => {
                    if !live_shadow(&mut shadow, world, *target)?.types.remove(component) {
                        return Err(EcsError::missing(*target, *component));
                    }
                }
                Command::Destroy { target } => {
                    live_shadow(&mut shadow, world, *target)?.alive = false;
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, target: EntityRef, created: &[Entity]) -> Result<Entity, EcsError> {
        match target {
            EntityRef::Entity(entity) => Ok(entity),
            EntityRef::Placeholder(placeholder) => created
                .get(placeholder.index() as usize)
                .copied()
                .filter(|_| placeholder.buffer() == self.id)
                .ok_or(EcsError::UnknownPlaceholder(placeholder)),
        }
    }

    fn ensure_recording(&self) -> Result<(), EcsError> {
        match self.state {
            BufferState::Recording => Ok(()),
            BufferState::PlayedBack => Err(EcsError::AlreadyPlayedBack),
        }
    }

    /// Reject placeholders that this buffer did not hand out.
    fn check_target(&self, target: EntityRef) -> Result<EntityRef, EcsError> {
        self.ensure_recording()?;
        if let EntityRef::Placeholder(placeholder) = target {
            if placeholder.buffer() != self.id || placeholder.index() >= self.placeholders {
                return Err(EcsError::UnknownPlaceholder(placeholder));
            }
        }
        Ok(target)
    }

    fn next_placeholder(&mut self) -> Placeholder {
        let placeholder = Placeholder::new(self.id, self.placeholders);
        self.placeholders += 1;
        placeholder
    }
}

/// The simulated state of one entity during validation.
#[derive(Debug)]
struct Shadow {
    alive: bool,
    types: BTreeSet<ComponentTypeId>,
}

impl Shadow {
    fn alive(types: BTreeSet<ComponentTypeId>) -> Self {
        Self { alive: true, types }
    }
}

/// Returns the shadow of `target`, seeding it from `world` on first use.
fn live_shadow<'s>(
    shadow: &'s mut HashMap<EntityRef, Shadow>,
    world: &World,
    target: EntityRef,
) -> Result<&'s mut Shadow, EcsError> {
    let dead = || match target {
        EntityRef::Entity(entity) => EcsError::InvalidEntity(entity),
        EntityRef::Placeholder(placeholder) => EcsError::UnknownPlaceholder(placeholder),
    };

    if !shadow.contains_key(&target) {
        let EntityRef::Entity(entity) = target else {
            return Err(dead());
        };
        let types = world.components_of(entity)?.into_iter().collect();
        shadow.insert(target, Shadow::alive(types));
    }
    shadow
        .get_mut(&target)
        .filter(|state| state.alive)
        .ok_or_else(dead)
}
