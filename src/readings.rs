//! Readings published to consumers.
//!
//! Every value the engine extracts from the controller is published as a
//! [`Reading`]: a [`ReadingKind`] naming the quantity and a [`ReadingValue`]
//! carrying it. Units are fixed per kind and listed on each variant.

use serde::{Deserialize, Serialize};

/// Quantity a reading reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    // --- Status ---
    /// Gallons per minute.
    CurrentFlow,
    /// Gallons.
    SoftWaterRemaining,
    /// Gallons.
    UsageToday,
    /// Gallons per minute.
    PeakFlow,
    /// Grains per gallon.
    Hardness,
    /// Percent.
    BatteryLevel,
    /// Text, controller clock.
    DeviceTime,
    /// Text, scheduled regeneration time.
    RegenTime,
    DisplayOff,
    BypassActive,
    ShutoffActive,
    BypassEnabled,
    ShutoffEnabled,

    // --- Brine ---
    /// Pounds.
    SaltRemaining,
    /// Pounds.
    BrineTankCapacity,
    /// Percent.
    BrineSaltPercent,
    /// Regenerations.
    LowSaltAlert,
    /// Days.
    FilterBackwashDays,
    /// Days.
    AirRechargeDays,
    RegenActive,

    // --- Settings ---
    /// Days.
    DaysUntilRegen,
    /// Days.
    RegenDayOverride,
    /// Percent.
    ReserveCapacity,
    /// Grains.
    ResinCapacity,
    /// Hours; only published while prefill is enabled.
    PrefillDuration,
    /// Hours.
    SoakDuration,
    /// Days.
    AirRechargeFrequency,
    PrefillEnabled,
    PrefillSoakMode,
    RentalUnit,
    RentalRegenDisabled,

    // --- Cycle ---
    /// Minutes.
    BackwashTime,
    /// Minutes.
    BrineDrawTime,
    /// Minutes.
    RapidRinseTime,
    /// Minutes.
    BrineRefillTime,
    /// Minutes.
    CyclePosition5,
    /// Minutes.
    CyclePosition6,
    /// Minutes.
    CyclePosition7,
    /// Minutes.
    CyclePosition8,

    // --- Statistics ---
    /// Gallons.
    TotalGallons,
    /// Gallons.
    TotalGallonsResettable,
    TotalRegens,
    TotalRegensResettable,
    /// Gallons per day.
    AverageDailyUsage,

    // --- Session ---
    /// Text, `C{major}.{minor}`.
    FirmwareVersion,
}

impl ReadingKind {
    /// Cycle-position kinds in wire order.
    pub const CYCLE_POSITIONS: [ReadingKind; 8] = [
        ReadingKind::BackwashTime,
        ReadingKind::BrineDrawTime,
        ReadingKind::RapidRinseTime,
        ReadingKind::BrineRefillTime,
        ReadingKind::CyclePosition5,
        ReadingKind::CyclePosition6,
        ReadingKind::CyclePosition7,
        ReadingKind::CyclePosition8,
    ];
}

/// Value carried by a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

/// One published reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub kind: ReadingKind,
    pub value: ReadingValue,
}

impl Reading {
    pub fn number(kind: ReadingKind, value: f64) -> Self {
        Self {
            kind,
            value: ReadingValue::Number(value),
        }
    }

    pub fn flag(kind: ReadingKind, value: bool) -> Self {
        Self {
            kind,
            value: ReadingValue::Flag(value),
        }
    }

    pub fn text(kind: ReadingKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: ReadingValue::Text(value.into()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            ReadingValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self.value {
            ReadingValue::Flag(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            ReadingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
