//! Engine configuration.
//!
//! All protocol timing is expressed as deferred transitions evaluated on ticks, so
//! every delay the engine honours lives here. Durations serialise as integer
//! milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::error::ConfigError;
use crate::types::Password;

/// Default interval between full poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Default interval between keepalive writes.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(4);
/// Default minimum spacing between successive poll commands.
pub const DEFAULT_COMMAND_SPACING: Duration = Duration::from_millis(20);
/// Default delay before a finished poll cycle returns to idle.
pub const DEFAULT_CYCLE_COOLDOWN: Duration = Duration::from_millis(100);
/// Default delay between the authentication reply and the first poll cycle.
pub const DEFAULT_AUTH_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Configuration for a [`SoftenerEngine`](crate::engine::SoftenerEngine).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device password used for the authentication reply.
    pub password: Password,
    /// Interval between full status/settings/statistics poll cycles.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    /// Interval between keepalive writes while authenticated.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub keepalive_interval: Duration,
    /// Minimum spacing between successive poll commands.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub command_spacing: Duration,
    /// Delay after the last poll command before the sequencer idles again.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cycle_cooldown: Duration,
    /// Delay between the authentication reply and the first poll cycle.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub auth_settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            password: Password::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            command_spacing: DEFAULT_COMMAND_SPACING,
            cycle_cooldown: DEFAULT_CYCLE_COOLDOWN,
            auth_settle_delay: DEFAULT_AUTH_SETTLE_DELAY,
        }
    }
}

impl EngineConfig {
    /// Returns the configuration with `password` replaced.
    pub fn with_password(mut self, password: Password) -> Self {
        self.password = password;
        self
    }

    /// Checks that the periodic timers can make progress.
    ///
    /// Spacing, cooldown and settle delay may be zero; the poll and keepalive
    /// intervals may not, since a zero interval would fire on every tick.
    ///
    /// # Errors
    /// - [`ConfigError::ZeroInterval`] - Poll or keepalive interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll_interval"));
        }
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("keepalive_interval"));
        }
        Ok(())
    }
}
