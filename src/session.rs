//! Per-connection session state.
//!
//! A [`Session`] is created fresh on every connect and dropped wholesale on
//! disconnect, so nothing in it can leak into the next connection.

use serde::Serialize;

use crate::constants::REGENS_NOT_CONFIGURED;
use crate::history::{DailyUsageHistory, HistoryContinuation};
use crate::packets::types::StatusFlags;
use crate::types::{ConnectionCounter, FirmwareVersion};

/// Brine tank geometry and salt state as reported by status sub-sequence 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrineTankConfig {
    /// Tank diameter in inches (16, 18, 24 or 30).
    pub tank_type: u8,
    /// Salt fill height in inches.
    pub fill_height: u8,
    /// Brine refill duration in minutes.
    pub refill_minutes: u8,
    /// Regenerations left on the current salt load; 0xFF when not configured.
    pub regens_remaining: u8,
}

impl BrineTankConfig {
    /// Returns `true` unless the controller reports the "not configured" sentinel.
    pub const fn is_configured(&self) -> bool {
        self.regens_remaining != REGENS_NOT_CONFIGURED
    }
}

impl Default for BrineTankConfig {
    fn default() -> Self {
        Self {
            tank_type: 0,
            fill_height: 0,
            refill_minutes: 0,
            regens_remaining: REGENS_NOT_CONFIGURED,
        }
    }
}

/// Everything the engine knows about the current connection.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Set once the handshake has been answered; the protocol has no explicit accept.
    pub authenticated: bool,
    pub handshake_received: bool,
    pub auth_required: bool,
    pub counter: ConnectionCounter,
    pub firmware: Option<FirmwareVersion>,
    pub brine: BrineTankConfig,
    pub flags: Option<StatusFlags>,
    pub regen_active: bool,
    pub history: DailyUsageHistory,
    pub continuation: HistoryContinuation,
}

impl Session {
    /// Creates an unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any partially received usage history. Called when a poll cycle starts.
    pub fn begin_history_cycle(&mut self) {
        self.history.reset();
        self.continuation = HistoryContinuation::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tank_is_unconfigured() {
        let tank = BrineTankConfig::default();
        assert!(!tank.is_configured());
        let configured = BrineTankConfig {
            regens_remaining: 0,
            ..tank
        };
        assert!(configured.is_configured());
    }

    #[test]
    fn new_session_is_unauthenticated() {
        let session = Session::new();
        assert!(!session.authenticated);
        assert!(!session.handshake_received);
        assert_eq!(session.firmware, None);
        assert_eq!(session.continuation, HistoryContinuation::Idle);
    }

    #[test]
    fn history_cycle_resets_continuation() {
        let mut session = Session::new();
        session.continuation = HistoryContinuation::Fragment2;
        session.history.write(0, &[100]);
        session.begin_history_cycle();
        assert_eq!(session.continuation, HistoryContinuation::Idle);
        assert_eq!(session.history.filled(), 0);
    }
}
