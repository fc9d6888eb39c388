//! Cross-buffer ordering.
//!
//! Producers hand finished [`CommandBuffer`]s to a [`CommandSubmitter`]; the
//! owner of the world drains the [`CommandQueue`] and plays the buffers back
//! in the order they were submitted. Submission order is the only ordering
//! defined between buffers.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use genesis_component::{EcsError, Entity};

use crate::command::CommandBuffer;
use crate::world::World;

/// Summary of one [`CommandQueue::apply`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Buffers played back successfully.
    pub applied: usize,
    /// Buffers rejected by validation and skipped.
    pub failed: usize,
    /// Entities created by the applied buffers, in playback order.
    pub created: Vec<Entity>,
}

/// Cloneable, `Send` handle used to submit buffers from any thread or task.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    sender: mpsc::UnboundedSender<CommandBuffer>,
}

impl CommandSubmitter {
    /// Enqueue a recorded buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::QueueClosed`] if the queue was dropped.
    pub fn submit(&self, buffer: CommandBuffer) -> Result<(), EcsError> {
        self.sender.send(buffer).map_err(|_| EcsError::QueueClosed)
    }
}

/// FIFO of submitted command buffers.
#[derive(Debug)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<CommandBuffer>,
    receiver: mpsc::UnboundedReceiver<CommandBuffer>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// A new handle for submitting buffers.
    #[must_use]
    pub fn submitter(&self) -> CommandSubmitter {
        CommandSubmitter {
            sender: self.sender.clone(),
        }
    }

    /// Play back every buffer submitted so far, oldest first.
    ///
    /// A buffer that fails validation is logged and skipped; the world is
    /// unchanged by it and the remaining buffers still apply.
    pub fn apply(&mut self, world: &mut World) -> ApplyReport {
        let mut report = ApplyReport::default();
        while let Ok(mut buffer) = self.receiver.try_recv() {
            match buffer.playback(world) {
                Ok(created) => {
                    report.applied += 1;
                    report.created.extend(created);
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(buffer = buffer.id(), commands = buffer.len(), error = %err, "rejected command buffer");
                }
            }
        }
        if report.applied + report.failed > 0 {
            debug!(
                applied = report.applied,
                failed = report.failed,
                created = report.created.len(),
                "applied command queue"
            );
        }
        report
    }
}
