#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_millis(2500);
const DEFAULT_GRACE_PERIOD_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_millis(2500);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Liveness probe the device firmware answers outside the JSON envelope.
pub const DEFAULT_PROBE_FRAME: &str = "ping";
/// Reply the device firmware sends for [`DEFAULT_PROBE_FRAME`].
pub const DEFAULT_REPLY_FRAME: &str = "pong";

/// Configuration for connection manager behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between liveness probes while the connection is open
    pub heartbeat_interval: Duration,
    /// Maximum time to wait for the probe reply before considering the connection dead
    pub grace_period: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// Text frame sent as the liveness probe
    pub probe_frame: String,
    /// Text frame expected in reply to a probe
    pub reply_frame: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            grace_period: DEFAULT_GRACE_PERIOD_DURATION,
            reconnect: ReconnectConfig::default(),
            probe_frame: DEFAULT_PROBE_FRAME.to_owned(),
            reply_frame: DEFAULT_REPLY_FRAME.to_owned(),
        }
    }
}

impl Config {
    /// Reject configurations that would spin timers or never match a reply.
    pub fn validate(&self) -> Result<()> {
        non_zero("heartbeat_interval", self.heartbeat_interval)?;
        non_zero("grace_period", self.grace_period)?;
        non_zero("reconnect.interval", self.reconnect.interval)?;
        if let Some(backoff) = &self.reconnect.backoff {
            non_zero("reconnect.backoff.initial", backoff.initial)?;
            if backoff.max < backoff.initial {
                return Err(Error::validation(
                    "reconnect.backoff.max must not be smaller than reconnect.backoff.initial",
                ));
            }
        }
        if self.probe_frame.is_empty() || self.reply_frame.is_empty() {
            return Err(Error::validation("heartbeat frames must not be empty"));
        }
        Ok(())
    }
}

pub(crate) fn non_zero(name: &str, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(Error::validation(format!("{name} must be non-zero")));
    }
    Ok(())
}

/// Configuration for automatic reconnection behavior.
///
/// Attempts repeat until a connection opens or the manager is stopped; there is no
/// attempt limit.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Fixed delay between open attempts, used when `backoff` is `None`
    pub interval: Duration,
    /// Optional capped exponential backoff replacing the fixed interval
    pub backoff: Option<BackoffConfig>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL_DURATION,
            backoff: None,
        }
    }
}

/// Capped exponential backoff between reconnect attempts.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial backoff duration for first reconnection attempt
    pub initial: Duration,
    /// Maximum backoff duration
    pub max: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_BACKOFF_DURATION,
            max: DEFAULT_MAX_BACKOFF_DURATION,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<BackoffConfig> for ExponentialBackoff {
    fn from(config: BackoffConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial)
            .with_max_interval(config.max)
            .with_multiplier(config.multiplier)
            .with_max_elapsed_time(None) // Retry until stopped
            .build()
    }
}
