use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of checking a [`CancellationContext`] at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointResult {
    Continue,
    Cancelled,
    TimedOut,
}

/// Cooperative cancellation signal plus a wall-clock deadline, passed as
/// the first parameter to every long-running operation (LLM calls, tool
/// dispatch, the round loop itself). Cheap to clone; all clones share the
/// same underlying flag.
#[derive(Clone)]
pub struct CancellationContext {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl CancellationContext {
    pub fn new(budget: std::time::Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + budget,
        }
    }

    /// A context with no deadline, for use in tests and one-off tool
    /// calls that don't carry a request-level budget.
    pub fn no_deadline() -> Self {
        Self::new(std::time::Duration::from_secs(u64::MAX / 2))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_timed_out(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Check both cancellation and deadline in one call, prioritizing an
    /// explicit cancel over a timeout since a disconnect may race with
    /// the deadline.
    pub fn checkpoint(&self) -> CheckpointResult {
        if self.is_cancelled() {
            CheckpointResult::Cancelled
        } else if self.is_timed_out() {
            CheckpointResult::TimedOut
        } else {
            CheckpointResult::Continue
        }
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_context_continues() {
        let ctx = CancellationContext::new(Duration::from_secs(60));
        assert_eq!(ctx.checkpoint(), CheckpointResult::Continue);
    }

    #[test]
    fn cancel_is_visible_from_clones() {
        let ctx = CancellationContext::new(Duration::from_secs(60));
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.checkpoint(), CheckpointResult::Cancelled);
    }

    #[test]
    fn expired_deadline_times_out() {
        let ctx = CancellationContext::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ctx.checkpoint(), CheckpointResult::TimedOut);
    }

    #[test]
    fn cancellation_takes_priority_over_timeout() {
        let ctx = CancellationContext::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        ctx.cancel();
        assert_eq!(ctx.checkpoint(), CheckpointResult::Cancelled);
    }
}
