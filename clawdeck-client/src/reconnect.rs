//! Reconnection backoff.
//!
//! Retries are armed only when an established connection is lost. Each
//! scheduled attempt carries the epoch it was armed in; [`Backoff::cancel`]
//! bumps the epoch so a timer that already fired cannot resurrect the
//! connection after an explicit disconnect.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Number of attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before attempt number `attempt` (zero based):
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Mutable retry state of one connection.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    attempts: u32,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl Backoff {
    /// Consumes one attempt and returns its delay and epoch, or `None` once
    /// the cap is reached.
    pub(crate) fn next(&mut self, policy: &ReconnectPolicy) -> Option<(Duration, u64)> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        let delay = policy.delay_for(self.attempts);
        self.attempts += 1;
        Some((delay, self.epoch))
    }

    /// Stores the timer task of the attempt just scheduled.
    pub(crate) fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    /// Returns true if a timer armed in `epoch` may still fire.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Clears the attempt counter after a successful handshake.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Starts over for a connect requested by the caller: pending retries
    /// are dropped and the counter is cleared.
    pub(crate) fn restart(&mut self) {
        self.stop_timer();
        self.attempts = 0;
    }

    /// Explicit disconnect: exhausts the counter and invalidates any armed
    /// timer.
    pub(crate) fn cancel(&mut self, policy: &ReconnectPolicy) {
        self.stop_timer();
        self.attempts = policy.max_attempts;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    fn stop_timer(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
