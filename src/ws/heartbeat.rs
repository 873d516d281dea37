#![expect(
    clippy::module_name_repetitions,
    reason = "Heartbeat types carry the module name for clarity when re-exported"
)]

use std::time::Duration;

use tokio::time::Instant;

/// Liveness phase of an open connection.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPhase {
    /// No connection is being monitored
    Stopped,
    /// Connection open, no probe outstanding
    Idle,
    /// Probe sent, waiting for the reply within the grace period
    ProbePending,
}

/// Probe scheduling and grace-period bookkeeping for one connection at a time.
///
/// The monitor only computes instants; the connection actor sleeps until
/// [`next_probe`](Self::next_probe) or [`deadline`](Self::deadline) and calls back in.
/// Further probes sent while one is outstanding never push the deadline out: it is
/// always measured from the oldest unanswered probe.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    grace_period: Duration,
    next_probe: Option<Instant>,
    /// Send time of the oldest unanswered probe
    pending_since: Option<Instant>,
    last_reply: Option<Instant>,
    last_activity: Option<Instant>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(interval: Duration, grace_period: Duration) -> Self {
        Self {
            interval,
            grace_period,
            next_probe: None,
            pending_since: None,
            last_reply: None,
            last_activity: None,
        }
    }

    /// Begin monitoring a freshly opened connection.
    pub fn start(&mut self, now: Instant) {
        self.next_probe = Some(now + self.interval);
        self.pending_since = None;
        self.last_reply = Some(now);
        self.last_activity = Some(now);
    }

    /// Stop monitoring; cancels both the probe timer and any outstanding deadline.
    pub fn stop(&mut self) {
        self.next_probe = None;
        self.pending_since = None;
    }

    #[must_use]
    pub fn phase(&self) -> HeartbeatPhase {
        match (self.next_probe, self.pending_since) {
            (None, _) => HeartbeatPhase::Stopped,
            (Some(_), None) => HeartbeatPhase::Idle,
            (Some(_), Some(_)) => HeartbeatPhase::ProbePending,
        }
    }

    /// When the next probe is due, if monitoring.
    #[must_use]
    pub fn next_probe(&self) -> Option<Instant> {
        self.next_probe
    }

    /// When the outstanding probe expires, if one is outstanding.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_since.map(|sent| sent + self.grace_period)
    }

    /// Probe timer fired. Returns `true` if a probe frame should be sent now.
    pub fn on_probe_due(&mut self, now: Instant) -> bool {
        if self.next_probe.is_none() {
            return false;
        }
        self.next_probe = Some(now + self.interval);
        self.pending_since.get_or_insert(now);
        true
    }

    /// A reply frame arrived; the connection is alive.
    pub fn on_reply(&mut self, now: Instant) {
        self.last_reply = Some(now);
        self.pending_since = None;
    }

    /// Any frame arrived.
    pub fn on_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Whether the outstanding probe has gone unanswered past the grace period.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Replace the probe period; the probe timer is re-armed from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        if self.next_probe.is_some() {
            self.next_probe = Some(now + interval);
        }
    }

    /// Replace the grace period. An outstanding deadline moves with it, still measured
    /// from the probe's send time.
    pub fn set_grace_period(&mut self, grace_period: Duration) {
        self.grace_period = grace_period;
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    #[must_use]
    pub fn last_reply(&self) -> Option<Instant> {
        self.last_reply
    }

    #[must_use]
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}
