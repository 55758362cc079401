//! Typed views of decoded controller packets.
//!
//! Decoders copy raw wire values out of the ring buffer into these structs; scaled
//! engineering values are exposed through accessors so the wire representation
//! stays visible to callers and encoders.

use std::fmt;

use serde::Serialize;

use crate::constants::{
    CYCLE_DURATION_MASK, CYCLE_FIXED_BIT, CYCLE_POSITION_COUNT, FLOW_SCALE, RESIN_GRAIN_SCALE,
};
use crate::metrics;
use crate::session::BrineTankConfig;
use crate::types::{ConnectionCounter, FirmwareVersion};

/// AM/PM indicator byte following a clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Meridiem {
    Am,
    Pm,
    /// Any other byte: the hour is already on a 24-hour clock.
    TwentyFourHour,
}

impl Meridiem {
    /// Interprets the indicator byte (0 = AM, 1 = PM).
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Meridiem::Am,
            1 => Meridiem::Pm,
            _ => Meridiem::TwentyFourHour,
        }
    }

    /// Wire byte for this indicator. 24-hour times use 2.
    pub const fn to_byte(self) -> u8 {
        match self {
            Meridiem::Am => 0,
            Meridiem::Pm => 1,
            Meridiem::TwentyFourHour => 2,
        }
    }
}

/// A time of day as the controller reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub meridiem: Meridiem,
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.meridiem {
            Meridiem::Am => write!(f, "{}:{:02} AM", self.hour, self.minute),
            Meridiem::Pm => write!(f, "{}:{:02} PM", self.hour, self.minute),
            Meridiem::TwentyFourHour => write!(f, "{:02}:{:02}", self.hour, self.minute),
        }
    }
}

/// Status bitfield shared by status sub-sequence 0 and settings sub-sequence 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(transparent)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    pub const SHUTOFF_ENABLED: u8 = 0x01;
    pub const BYPASS_ENABLED: u8 = 0x02;
    pub const SHUTOFF_ACTIVE: u8 = 0x04;
    pub const BYPASS_ACTIVE: u8 = 0x08;
    pub const DISPLAY_OFF: u8 = 0x10;

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn shutoff_enabled(self) -> bool {
        self.0 & Self::SHUTOFF_ENABLED != 0
    }

    pub const fn bypass_enabled(self) -> bool {
        self.0 & Self::BYPASS_ENABLED != 0
    }

    pub const fn shutoff_active(self) -> bool {
        self.0 & Self::SHUTOFF_ACTIVE != 0
    }

    pub const fn bypass_active(self) -> bool {
        self.0 & Self::BYPASS_ACTIVE != 0
    }

    pub const fn display_off(self) -> bool {
        self.0 & Self::DISPLAY_OFF != 0
    }
}

/// Handshake (`tt`) contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub firmware: FirmwareVersion,
    pub auth_flag: u8,
    pub counter: ConnectionCounter,
}

impl Handshake {
    /// Whether this handshake must be answered with an authentication reply.
    pub const fn auth_required(&self) -> bool {
        self.firmware.requires_auth(self.auth_flag)
    }
}

/// Status sub-sequence 0: real-time readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRealtime {
    pub time: ClockTime,
    pub battery_code: u8,
    /// Hundredths of a gallon per minute.
    pub current_flow_raw: u16,
    pub soft_water_remaining: u16,
    pub usage_today: u16,
    /// Hundredths of a gallon per minute.
    pub peak_flow_raw: u16,
    pub hardness_gpg: u8,
    pub regen_hour: u8,
    pub regen_meridiem: Meridiem,
    pub flags: StatusFlags,
}

impl StatusRealtime {
    pub fn current_flow_gpm(&self) -> f64 {
        f64::from(self.current_flow_raw) / FLOW_SCALE
    }

    pub fn peak_flow_gpm(&self) -> f64 {
        f64::from(self.peak_flow_raw) / FLOW_SCALE
    }

    pub fn battery_percent(&self) -> f64 {
        metrics::battery_percent(self.battery_code)
    }

    /// Scheduled regeneration time (on the hour).
    pub fn regen_time(&self) -> ClockTime {
        ClockTime {
            hour: self.regen_hour,
            minute: 0,
            meridiem: self.regen_meridiem,
        }
    }
}

/// Status sub-sequence 1: brine tank and regeneration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrineStatus {
    pub filter_backwash_days: u8,
    pub air_recharge_days: u8,
    pub regen_active: bool,
    pub low_salt_alert: u8,
    pub tank: BrineTankConfig,
}

/// Settings sub-sequence 0: configuration.
///
/// Resin scaling and the prefill/rental byte positions follow the later protocol
/// notes and still want confirmation against a live controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsConfig {
    pub days_until_regen: u8,
    pub regen_day_override: u8,
    pub reserve_capacity_percent: u8,
    /// Thousands of grains.
    pub resin_capacity_raw: u16,
    pub prefill_enabled: bool,
    pub prefill_duration_hours: u8,
    /// Never below 1.
    pub soak_duration_hours: u8,
    pub prefill_soak_mode: bool,
    pub rental_unit: bool,
    pub rental_regen_disabled: bool,
    pub air_recharge_frequency_days: u8,
    pub flags: StatusFlags,
}

impl SettingsConfig {
    pub fn resin_capacity_grains(&self) -> u32 {
        u32::from(self.resin_capacity_raw) * RESIN_GRAIN_SCALE
    }
}

/// One regeneration cycle step from settings sub-sequence 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CyclePosition {
    pub duration_minutes: u8,
    /// Set when the step length cannot be adjusted.
    pub fixed: bool,
}

impl CyclePosition {
    /// Unpacks a cycle-position byte.
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            duration_minutes: byte & CYCLE_DURATION_MASK,
            fixed: byte & CYCLE_FIXED_BIT != 0,
        }
    }

    /// Packs into a cycle-position byte.
    pub const fn to_byte(self) -> u8 {
        (self.duration_minutes & CYCLE_DURATION_MASK) | if self.fixed { CYCLE_FIXED_BIT } else { 0 }
    }
}

/// Settings sub-sequence 1: regeneration cycle step durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleTimes {
    pub positions: [CyclePosition; CYCLE_POSITION_COUNT],
}

impl CycleTimes {
    pub fn backwash(&self) -> CyclePosition {
        self.positions[0]
    }

    pub fn brine_draw(&self) -> CyclePosition {
        self.positions[1]
    }

    pub fn rapid_rinse(&self) -> CyclePosition {
        self.positions[2]
    }

    pub fn brine_refill(&self) -> CyclePosition {
        self.positions[3]
    }
}

/// Statistics sub-sequence 0: lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsTotals {
    /// Hundredths of a gallon per minute.
    pub current_flow_raw: u16,
    pub total_gallons: u32,
    pub total_gallons_resettable: u32,
    pub total_regens: u16,
    pub total_regens_resettable: u16,
}

impl StatisticsTotals {
    pub fn current_flow_gpm(&self) -> f64 {
        f64::from(self.current_flow_raw) / FLOW_SCALE
    }
}

/// A slice of the daily-usage history, already scaled to gallons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageFragment {
    /// History index of the first entry.
    pub start_index: usize,
    pub gallons: Vec<u16>,
    /// Set on the final fragment of the history.
    pub last: bool,
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Handshake(Handshake),
    StatusRealtime(StatusRealtime),
    BrineStatus(BrineStatus),
    /// Status sub-sequences 2 and above; the trailing headerless packets are flushed.
    StatusHistory { sequence: u8 },
    SettingsConfig(SettingsConfig),
    CycleTimes(CycleTimes),
    StatisticsTotals(StatisticsTotals),
    UsageFragment(UsageFragment),
    Keepalive { sequence: u8 },
    /// A recognised packet with a sub-sequence that carries nothing of interest.
    Skipped { tag: u8, sequence: u8 },
}

impl Packet {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Handshake(_) => "handshake",
            Packet::StatusRealtime(_) => "status-0",
            Packet::BrineStatus(_) => "status-1",
            Packet::StatusHistory { .. } => "status-history",
            Packet::SettingsConfig(_) => "settings-0",
            Packet::CycleTimes(_) => "settings-1",
            Packet::StatisticsTotals(_) => "statistics-0",
            Packet::UsageFragment(_) => "usage-history",
            Packet::Keepalive { .. } => "keepalive",
            Packet::Skipped { .. } => "skipped",
        }
    }
}
