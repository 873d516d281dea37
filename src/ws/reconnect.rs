#![expect(
    clippy::module_name_repetitions,
    reason = "Reconnect types carry the module name for clarity when re-exported"
)]

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tokio::time::Instant;

use super::config::ReconnectConfig;

/// Schedules open attempts while the connection is down.
///
/// Once armed the scheduler keeps firing, one attempt per period, until it is
/// cancelled by a successful open or by the manager stopping. Whether a tick actually
/// opens a socket is decided by the caller, which knows if an attempt is in flight.
#[derive(Debug)]
pub struct ReconnectScheduler {
    interval: Duration,
    backoff: Option<ExponentialBackoff>,
    next_attempt: Option<Instant>,
    attempts: u32,
}

impl ReconnectScheduler {
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            interval: config.interval,
            backoff: config.backoff.clone().map(Into::into),
            next_attempt: None,
            attempts: 0,
        }
    }

    /// Arm the timer unless it already is. Re-arming would postpone a pending attempt.
    pub fn schedule(&mut self, now: Instant) {
        if !self.is_armed() {
            self.next_attempt = Some(now + self.next_delay());
        }
    }

    /// The timer fired: count the attempt and arm the next period.
    pub fn on_tick(&mut self, now: Instant) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt = Some(now + self.next_delay());
        self.attempts
    }

    /// Disarm and forget the backoff progression.
    pub fn cancel(&mut self) {
        self.next_attempt = None;
        self.attempts = 0;
        if let Some(backoff) = &mut self.backoff {
            backoff.reset();
        }
    }

    /// Switch to a fixed period. A pending attempt is re-armed at the new period from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.backoff = None;
        if self.is_armed() {
            self.next_attempt = Some(now + interval);
        }
    }

    #[must_use]
    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.next_attempt.is_some()
    }

    /// Attempts made since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn next_delay(&mut self) -> Duration {
        self.backoff
            .as_mut()
            .and_then(Backoff::next_backoff)
            .unwrap_or(self.interval)
    }
}
