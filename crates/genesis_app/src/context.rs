//! Per-tick execution context provided to system functions.

/// Context provided to a system function on each tick.
#[derive(Debug, Clone, Copy)]
pub struct SystemContext {
    /// The current tick ID.
    pub tick_id: u64,
    /// Delta time since the last tick, in seconds.
    pub dt: f64,
}

impl SystemContext {
    /// Create a new context for a tick.
    #[must_use]
    pub fn new(tick_id: u64, dt: f64) -> Self {
        Self { tick_id, dt }
    }

    /// Delta time as `f32`, for scaling component math.
    #[must_use]
    pub fn dt_f32(&self) -> f32 {
        self.dt as f32
    }

    /// Returns `true` on every `period`-th tick. A zero period never fires.
    #[must_use]
    pub fn every(&self, period: u64) -> bool {
        period != 0 && self.tick_id % period == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = SystemContext::new(1, 0.016);
        assert_eq!(ctx.tick_id, 1);
        assert!((ctx.dt - 0.016).abs() < f64::EPSILON);
    }

    #[test]
    fn test_every() {
        assert!(SystemContext::new(30, 0.0).every(10));
        assert!(!SystemContext::new(31, 0.0).every(10));
        assert!(!SystemContext::new(30, 0.0).every(0));
    }
}
