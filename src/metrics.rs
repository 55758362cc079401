//! Derived metrics computed from decoded fields.
//!
//! Everything here is a pure function of wire values; plausibility checks on the
//! results live in [`crate::validator`].

use tracing::warn;

use crate::constants::{
    AVERAGE_WINDOW_START, DAILY_HISTORY_LEN, MAX_PLAUSIBLE_DAILY_GALLONS,
    SALT_POUNDS_PER_REFILL_MINUTE,
};
use crate::session::BrineTankConfig;

/// Battery charge in percent for a status battery code. Unknown codes map to 0.
pub fn battery_percent(code: u8) -> f64 {
    match code {
        1 => 100.0,
        2 => 75.0,
        3 => 50.0,
        4 => 25.0,
        _ => 0.0,
    }
}

/// Pounds of salt per inch of fill height for a tank diameter in inches.
///
/// Unknown diameters use the 16-inch figure.
pub fn tank_multiplier(tank_type: u8) -> f64 {
    match tank_type {
        18 => 10.4,
        24 => 18.6,
        30 => 29.55,
        _ => 8.1,
    }
}

/// Salt capacity of the brine tank in pounds.
pub fn tank_capacity_lbs(tank: &BrineTankConfig) -> f64 {
    f64::from(tank.fill_height) * tank_multiplier(tank.tank_type)
}

/// Pounds of salt dissolved by one regeneration.
pub fn salt_per_regen_lbs(tank: &BrineTankConfig) -> f64 {
    f64::from(tank.refill_minutes) * SALT_POUNDS_PER_REFILL_MINUTE
}

/// Estimated salt left in the tank, in pounds.
///
/// Only meaningful when [`BrineTankConfig::is_configured`] holds.
pub fn salt_remaining_lbs(tank: &BrineTankConfig) -> f64 {
    salt_per_regen_lbs(tank) * f64::from(tank.regens_remaining)
}

/// Salt level as a percentage of tank capacity, clamped to `[0, 100]`.
///
/// # Returns
/// 0 when the capacity is zero.
pub fn salt_percent(salt_lbs: f64, capacity_lbs: f64) -> f64 {
    if capacity_lbs <= 0.0 {
        return 0.0;
    }
    (salt_lbs / capacity_lbs * 100.0).clamp(0.0, 100.0)
}

/// Mean daily usage over the most recent history window.
///
/// Averages indices 31 through 61 of `entries`. Entries above the plausibility
/// ceiling are logged and skipped. An empty window yields 0.
pub fn average_daily_usage(entries: &[u16; DAILY_HISTORY_LEN]) -> f64 {
    let mut sum = 0u32;
    let mut count = 0u32;
    for (index, &gallons) in entries.iter().enumerate().skip(AVERAGE_WINDOW_START) {
        if gallons > MAX_PLAUSIBLE_DAILY_GALLONS {
            warn!(index, gallons, "skipping implausible daily usage entry");
            continue;
        }
        sum += u32::from(gallons);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        f64::from(sum) / f64::from(count)
    }
}
