//! Fixed-timestep tick loop.
//!
//! One tick:
//!
//! 1. Play back command buffers submitted from outside the loop, in
//!    submission order.
//! 2. Recompute execution stages if the system set changed.
//! 3. For each stage: run its systems concurrently against a shared `&World`,
//!    each recording into its own command buffer, then play the buffers back
//!    in registration order.
//! 4. Advance the tick counter.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, ensure};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use genesis_component::EcsError;
use genesis_world::{ApplyReport, CommandBuffer, CommandQueue, CommandSubmitter, World};

use crate::context::SystemContext;
use crate::registry::{SystemInfo, SystemRegistry};
use crate::scheduler::{self, Stage};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Shortest tick the loop will schedule.
    pub const MIN_TICK_DURATION: Duration = Duration::from_micros(100);
    /// Longest tick the loop will schedule.
    pub const MAX_TICK_DURATION: Duration = Duration::from_secs(3600);

    /// Check that `tick_rate` maps to a tick duration within
    /// [`Self::MIN_TICK_DURATION`] and [`Self::MAX_TICK_DURATION`].
    ///
    /// # Errors
    ///
    /// Fails for a rate that is not finite, not positive or out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick rate must be a positive finite number, got {}",
            self.tick_rate
        );
        let duration = Duration::try_from_secs_f64(1.0 / self.tick_rate)
            .with_context(|| format!("tick rate {} is too small", self.tick_rate))?;
        ensure!(
            (Self::MIN_TICK_DURATION..=Self::MAX_TICK_DURATION).contains(&duration),
            "tick rate {} gives a {:?} tick, outside {:?}..={:?}",
            self.tick_rate,
            duration,
            Self::MIN_TICK_DURATION,
            Self::MAX_TICK_DURATION
        );
        Ok(())
    }

    /// Wall-clock budget of one tick, clamped to
    /// [`Self::MIN_TICK_DURATION`]..=[`Self::MAX_TICK_DURATION`].
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate)
            .unwrap_or(Self::MAX_TICK_DURATION)
            .clamp(Self::MIN_TICK_DURATION, Self::MAX_TICK_DURATION)
    }
}

/// What happened during one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick_id: u64,
    /// Systems that ran to completion.
    pub systems_run: usize,
    /// Systems that returned an error or panicked; their buffers are dropped.
    pub systems_failed: usize,
    /// Command buffers played back, external and system-recorded.
    pub buffers_applied: usize,
    /// Command buffers rejected at playback.
    pub buffers_failed: usize,
    /// Entities created by playback.
    pub entities_created: usize,
}

impl TickReport {
    fn absorb(&mut self, applied: &ApplyReport) {
        self.buffers_applied += applied.applied;
        self.buffers_failed += applied.failed;
        self.entities_created += applied.created.len();
    }
}

/// The tick loop state: world, systems and the external command queue.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    world: World,
    registry: SystemRegistry,
    queue: CommandQueue,
    /// Cached stages, recomputed when the system set changes.
    stages: Vec<Stage>,
    stages_dirty: bool,
}

impl TickLoop {
    /// Create a new tick loop with an empty world.
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self {
            tick_id: 0,
            config,
            world: World::new(),
            registry: SystemRegistry::new(),
            queue: CommandQueue::new(),
            stages: Vec::new(),
            stages_dirty: true,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    /// Returns a mutable reference to the system registry and marks the
    /// stage cache dirty.
    pub fn registry_mut(&mut self) -> &mut SystemRegistry {
        self.stages_dirty = true;
        &mut self.registry
    }

    /// A handle for submitting command buffers from other threads or tasks.
    /// They are applied at the start of the next tick.
    #[must_use]
    pub fn submitter(&self) -> CommandSubmitter {
        self.queue.submitter()
    }

    /// Returns the current execution stages, recomputing if necessary.
    pub fn stages(&mut self) -> &[Stage] {
        if self.stages_dirty {
            self.recompute_stages();
        }
        &self.stages
    }

    fn recompute_stages(&mut self) {
        self.stages = scheduler::compute_stages(self.registry.iter().map(|info| &info.query));
        self.stages_dirty = false;

        info!(
            tick_id = self.tick_id,
            stage_count = self.stages.len(),
            system_count = self.registry.len(),
            "recomputed execution stages"
        );
    }

    /// Run one tick of the simulation.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        self.tick_id += 1;
        if self.stages_dirty {
            self.recompute_stages();
        }

        let mut report = TickReport {
            tick_id: self.tick_id,
            ..TickReport::default()
        };
        report.absorb(&self.queue.apply(&mut self.world));

        let ctx = SystemContext::new(self.tick_id, dt);
        for (stage_idx, stage) in self.stages.iter().enumerate() {
            debug!(
                tick_id = self.tick_id,
                stage = stage_idx,
                systems = stage.system_indices.len(),
                "executing stage"
            );

            let buffers = run_stage(&self.registry, stage, &ctx, &self.world);
            report.systems_failed += stage.system_indices.len() - buffers.len();
            report.systems_run += buffers.len();

            for (name, mut buffer) in buffers {
                match buffer.playback(&mut self.world) {
                    Ok(created) => {
                        report.buffers_applied += 1;
                        report.entities_created += created.len();
                    }
                    Err(err) => {
                        report.buffers_failed += 1;
                        warn!(tick_id = self.tick_id, system = name, error = %err, "rejected system command buffer");
                    }
                }
            }
        }

        debug!(
            tick_id = self.tick_id,
            entities = self.world.entity_count(),
            created = report.entities_created,
            "tick complete"
        );
        report
    }

    /// Run the tick loop for the configured number of ticks, or
    /// indefinitely, blocking the current thread.
    pub fn run(&mut self) {
        let tick_duration = self.config.tick_duration();
        let dt = tick_duration.as_secs_f64();
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick(dt);

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                thread::sleep(tick_duration - elapsed);
            } else {
                self.warn_overrun(elapsed, tick_duration);
            }
        }
    }

    /// Async variant of [`TickLoop::run`] paced by a tokio interval.
    ///
    /// Ticks still execute synchronously; stages use scoped threads, not
    /// tasks.
    pub async fn run_async(&mut self) {
        let tick_duration = self.config.tick_duration();
        let dt = tick_duration.as_secs_f64();
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting async tick loop"
        );

        loop {
            interval.tick().await;
            let start = Instant::now();
            self.tick(dt);

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed > tick_duration {
                self.warn_overrun(elapsed, tick_duration);
            }
        }
    }

    fn warn_overrun(&self, elapsed: Duration, budget: Duration) {
        warn!(
            tick_id = self.tick_id,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "tick exceeded time budget"
        );
    }
}

/// Run every system of `stage` against `world` and collect the buffers of
/// those that succeeded, in stage order.
fn run_stage<'r>(
    registry: &'r SystemRegistry,
    stage: &Stage,
    ctx: &SystemContext,
    world: &World,
) -> Vec<(&'r str, CommandBuffer)> {
    let systems: Vec<_> = stage
        .system_indices
        .iter()
        .filter_map(|&index| registry.get_index(index))
        .collect();

    // A lone system runs on the calling thread; panics are caught either way.
    let outcomes: Vec<_> = if systems.len() == 1 {
        systems
            .into_iter()
            .map(|system| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_system(system, ctx, world)));
                (system.name.as_str(), outcome)
            })
            .collect()
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = systems
                .into_iter()
                .map(|system| {
                    let handle = scope.spawn(move || run_system(system, ctx, world));
                    (system.name.as_str(), handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| (name, handle.join()))
                .collect()
        })
    };

    outcomes
        .into_iter()
        .filter_map(|(name, outcome)| match outcome {
            Ok(Ok(buffer)) => Some((name, buffer)),
            Ok(Err(err)) => {
                warn!(system = name, error = %err, "system failed");
                None
            }
            Err(_) => {
                warn!(system = name, "system panicked");
                None
            }
        })
        .collect()
}

fn run_system(system: &SystemInfo, ctx: &SystemContext, world: &World) -> Result<CommandBuffer, EcsError> {
    let mut buffer = CommandBuffer::new();
    (system.run)(ctx, world, &mut buffer)?;
    Ok(buffer)
}
