//! Reconciliation runtime.
//!
//! This library drives reconcilers that converge stored objects towards
//! their declared state. Key concepts:
//!
//! - **Key**: the identity of one object; the unit of scheduling.
//! - **Work queue**: holds keys waiting to be reconciled and guarantees that
//!   a key is never handed to two workers at the same time.
//! - **Action**: what a reconcile asks for next (nothing, retry soon, retry
//!   after a delay).
//!
//! # Invariants
//!
//! - At most one in-flight reconcile per key
//! - A key added while it is being processed is reconciled again afterwards
//! - Failures back off exponentially per key; success resets the backoff

use std::time::Duration;

mod controller;
mod queue;

pub use controller::{Controller, ControllerConfig, ControllerStats, Reconciler};
pub use queue::WorkQueue;

/// Outcome of a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing left to do until the object changes.
    Done,

    /// Reconcile again soon, rate limited by the key's backoff.
    Requeue,

    /// Reconcile again after the given delay.
    RequeueAfter(Duration),
}

impl Action {
    pub fn done() -> Self {
        Self::Done
    }

    pub fn requeue() -> Self {
        Self::Requeue
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self::RequeueAfter(delay)
    }

    /// Returns true if the reconcile asked to run again.
    pub fn is_requeue(&self) -> bool {
        !matches!(self, Self::Done)
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(300),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exponent);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_delay = (delay + jitter).clamp(0.0, self.max.as_millis() as f64);

        Duration::from_millis(final_delay as u64)
    }
}

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default upper bound for a single reconcile.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: 0.0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_secs(1));
        assert_eq!(policy.delay(1000), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1000),
            max: Duration::from_secs(10),
            jitter: 0.25,
        };
        for _ in 0..100 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_action_is_requeue() {
        assert!(!Action::done().is_requeue());
        assert!(Action::requeue().is_requeue());
        assert!(Action::requeue_after(Duration::from_secs(1)).is_requeue());
    }
}
