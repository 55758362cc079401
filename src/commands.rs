//! Outbound command encoding.
//!
//! Every write to the controller is a 20-byte frame. Requests are the bare tag byte
//! repeated; control commands fill the frame with a base tag and place a sub-code
//! and arguments from byte 13 onwards.

use std::fmt;

use crate::constants::{
    COMMAND_LEN, COMMAND_PAYLOAD_OFFSET, DEFAULT_LOW_SALT_ALERT, MAX_HARDNESS_GPG,
    MAX_RESERVE_CAPACITY_PERCENT, MAX_SALT_REGENS, SALT_POUNDS_PER_REFILL_MINUTE, TAG_HANDSHAKE,
    TAG_KEEPALIVE, TAG_SETTINGS, TAG_STATISTICS, TAG_STATUS,
};
use crate::error::CommandError;
use crate::session::BrineTankConfig;

/// A complete 20-byte outbound frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; COMMAND_LEN]);

impl CommandFrame {
    /// Frame with every byte set to `tag`.
    pub const fn filled(tag: u8) -> Self {
        Self([tag; COMMAND_LEN])
    }

    /// Wraps raw frame bytes.
    pub const fn from_bytes(bytes: [u8; COMMAND_LEN]) -> Self {
        Self(bytes)
    }

    /// Frame bytes.
    pub const fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// First byte, which identifies the command family.
    pub const fn tag(&self) -> u8 {
        self.0[0]
    }

    fn with_payload(tag: u8, payload: &[u8]) -> Self {
        let mut frame = Self::filled(tag);
        frame.0[COMMAND_PAYLOAD_OFFSET..COMMAND_PAYLOAD_OFFSET + payload.len()]
            .copy_from_slice(payload);
        frame
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, "]")
    }
}

/// Commands the engine can send to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Asks the controller to start the session with a handshake packet.
    HandshakeRequest,
    /// Requests the status packet group.
    StatusRequest,
    /// Requests the settings packet group.
    SettingsRequest,
    /// Requests the statistics packet group.
    StatisticsRequest,
    /// Keeps the link from idling out.
    Keepalive,
    /// Starts a regeneration immediately.
    RegenNow,
    /// Schedules a regeneration at the next regen time.
    RegenNext,
    /// Sets the controller clock. `hour` is 0-23 and is sent in 12-hour form.
    SyncTime { hour: u8, minute: u8, second: u8 },
    /// Resets the resettable gallons counter.
    ResetGallons,
    /// Resets the resettable regenerations counter.
    ResetRegens,
    /// Turns the controller display on or off.
    SetDisplay { on: bool },
    /// Sets water hardness (grains per gallon, clamped to 99).
    SetHardness { grains_per_gallon: u8 },
    /// Sets the regeneration hour (clamped to 1-12).
    SetRegenTime { hour: u8, pm: bool },
    /// Sets reserve capacity percent (clamped to 49).
    SetReserveCapacity { percent: u8 },
    /// Reprograms the brine tank with a regeneration count.
    SetSaltLevel {
        regens: u8,
        tank_type: u8,
        fill_height: u8,
    },
}

impl Command {
    /// Builds a salt-level command from a salt weight in pounds.
    ///
    /// Pounds are converted to regenerations using the refill time reported by the
    /// controller (1.5 lbs per refill minute), capped at 100.
    ///
    /// # Errors
    /// - [`CommandError::BrineTankNotConfigured`] - Tank geometry unknown or refill time zero
    /// - [`CommandError::InvalidValue`] - `pounds` is negative or not finite
    pub fn set_salt_level(pounds: f64, tank: &BrineTankConfig) -> Result<Self, CommandError> {
        if !pounds.is_finite() || pounds < 0.0 {
            return Err(CommandError::InvalidValue {
                field: "pounds",
                description: format!("{} is not a usable salt weight", pounds),
            });
        }
        if !tank.is_configured() || tank.refill_minutes == 0 {
            return Err(CommandError::BrineTankNotConfigured);
        }
        let per_regen = f64::from(tank.refill_minutes) * SALT_POUNDS_PER_REFILL_MINUTE;
        let regens = (pounds / per_regen).min(f64::from(MAX_SALT_REGENS)) as u8;
        Ok(Command::SetSaltLevel {
            regens,
            tank_type: tank.tank_type,
            fill_height: tank.fill_height,
        })
    }

    /// Returns `true` for the poll and keepalive requests the engine issues itself.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Command::HandshakeRequest
                | Command::StatusRequest
                | Command::SettingsRequest
                | Command::StatisticsRequest
                | Command::Keepalive
        )
    }

    /// Encodes the command into its wire frame. Out-of-range arguments are clamped.
    pub fn encode(&self) -> CommandFrame {
        match *self {
            Command::HandshakeRequest => CommandFrame::filled(TAG_HANDSHAKE),
            Command::StatusRequest => CommandFrame::filled(TAG_STATUS),
            Command::SettingsRequest => CommandFrame::filled(TAG_SETTINGS),
            Command::StatisticsRequest => CommandFrame::filled(TAG_STATISTICS),
            Command::Keepalive => CommandFrame::filled(TAG_KEEPALIVE),
            Command::RegenNow => CommandFrame::with_payload(TAG_STATUS, b"RN"),
            Command::RegenNext => CommandFrame::with_payload(TAG_STATUS, b"RT"),
            Command::SyncTime {
                hour,
                minute,
                second,
            } => {
                let (hour12, pm) = to_twelve_hour(hour % 24);
                CommandFrame::with_payload(
                    TAG_STATUS,
                    &[b'T', hour12, minute.min(59), u8::from(pm), second.min(59)],
                )
            }
            Command::ResetGallons => CommandFrame::with_payload(TAG_STATISTICS, b"A"),
            Command::ResetRegens => CommandFrame::with_payload(TAG_STATISTICS, b"B"),
            // The controller uses 0 for "display on".
            Command::SetDisplay { on } => {
                CommandFrame::with_payload(TAG_SETTINGS, &[b'G', u8::from(!on)])
            }
            Command::SetHardness { grains_per_gallon } => CommandFrame::with_payload(
                TAG_STATUS,
                &[b'H', grains_per_gallon.min(MAX_HARDNESS_GPG)],
            ),
            Command::SetRegenTime { hour, pm } => {
                CommandFrame::with_payload(TAG_STATUS, &[b't', hour.clamp(1, 12), u8::from(pm)])
            }
            Command::SetReserveCapacity { percent } => CommandFrame::with_payload(
                TAG_SETTINGS,
                &[b'B', percent.min(MAX_RESERVE_CAPACITY_PERCENT)],
            ),
            Command::SetSaltLevel {
                regens,
                tank_type,
                fill_height,
            } => CommandFrame::with_payload(
                TAG_STATUS,
                &[
                    b'S',
                    regens.min(MAX_SALT_REGENS),
                    DEFAULT_LOW_SALT_ALERT,
                    tank_type,
                    fill_height,
                ],
            ),
        }
    }
}

/// Converts a 0-23 hour to `(1-12, pm)`.
fn to_twelve_hour(hour: u8) -> (u8, bool) {
    match hour {
        0 => (12, false),
        1..=11 => (hour, false),
        12 => (12, true),
        _ => (hour - 12, true),
    }
}
