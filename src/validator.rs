//! Plausibility guards for decoded readings.
//!
//! BLE notifications occasionally arrive with bytes shifted or corrupted in ways the
//! end markers do not catch. Each guarded reading passes through a [`ValueGuard`]
//! that enforces a hard range and a maximum step from the last accepted value. A
//! rejected reading is replaced by the last accepted one, so consumers see a steady
//! value rather than a spike.

use tracing::warn;

use crate::constants::SALT_CAPACITY_TOLERANCE;

/// How the step between consecutive readings is constrained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPolicy {
    /// Rises and falls are both limited to the maximum step.
    Symmetric,
    /// Like [`StepPolicy::Symmetric`], but a reading of exactly zero is always
    /// accepted (flow stopping, counters rolling over at midnight).
    AllowsDropToZero,
    /// Counter that only grows; it may rise by at most the maximum step and fall
    /// by at most `decrease_tolerance`.
    Monotonic { decrease_tolerance: f64 },
}

/// Hard limits for one guarded reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardLimits {
    pub floor: f64,
    pub ceiling: f64,
    pub max_step: f64,
    pub policy: StepPolicy,
}

impl GuardLimits {
    fn in_range(&self, value: f64) -> bool {
        value.is_finite() && value >= self.floor && value <= self.ceiling
    }

    fn step_allowed(&self, last: f64, value: f64) -> bool {
        let delta = value - last;
        match self.policy {
            StepPolicy::Symmetric => delta.abs() <= self.max_step,
            StepPolicy::AllowsDropToZero => value == 0.0 || delta.abs() <= self.max_step,
            StepPolicy::Monotonic { decrease_tolerance } => {
                delta >= -decrease_tolerance && delta <= self.max_step
            }
        }
    }
}

/// Range and step guard with a last-accepted fallback.
#[derive(Debug, Clone)]
pub struct ValueGuard {
    name: &'static str,
    limits: GuardLimits,
    last: Option<f64>,
    rejected_total: u64,
}

impl ValueGuard {
    /// Creates a guard with no accepted value.
    pub const fn new(name: &'static str, limits: GuardLimits) -> Self {
        Self {
            name,
            limits,
            last: None,
            rejected_total: 0,
        }
    }

    /// Checks `value` against the guard.
    ///
    /// # Parameters
    /// - `value`: The freshly decoded reading.
    ///
    /// # Returns
    /// `value` when accepted; otherwise the last accepted value, or `None` if
    /// nothing has been accepted yet.
    pub fn check(&mut self, value: f64) -> Option<f64> {
        if !self.limits.in_range(value) {
            warn!(
                reading = self.name,
                value,
                floor = self.limits.floor,
                ceiling = self.limits.ceiling,
                "reading out of range, keeping last value"
            );
            self.rejected_total += 1;
            return self.last;
        }

        if let Some(last) = self.last {
            if !self.limits.step_allowed(last, value) {
                self.rejected_total += 1;
                warn!(
                    reading = self.name,
                    value,
                    last,
                    max_step = self.limits.max_step,
                    "reading jumped too far, keeping last value"
                );
                return Some(last);
            }
        }

        self.last = Some(value);
        Some(value)
    }

    /// Last accepted value.
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Total readings rejected since creation.
    pub fn rejected_total(&self) -> u64 {
        self.rejected_total
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Forgets the accepted value. The rejection counter is kept.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// All guards the engine applies, plus the salt-level fallback.
#[derive(Debug, Clone)]
pub struct Validators {
    pub current_flow: ValueGuard,
    pub peak_flow: ValueGuard,
    pub soft_water_remaining: ValueGuard,
    pub usage_today: ValueGuard,
    pub total_gallons: ValueGuard,
    pub average_daily_usage: ValueGuard,
    last_salt_lbs: Option<f64>,
    salt_rejected_total: u64,
}

impl Validators {
    pub fn new() -> Self {
        let flow = GuardLimits {
            floor: 0.0,
            ceiling: 30.0,
            max_step: 15.0,
            policy: StepPolicy::AllowsDropToZero,
        };
        Self {
            current_flow: ValueGuard::new("current_flow", flow),
            peak_flow: ValueGuard::new("peak_flow", flow),
            soft_water_remaining: ValueGuard::new(
                "soft_water_remaining",
                GuardLimits {
                    floor: 0.0,
                    ceiling: 10_000.0,
                    max_step: 5_000.0,
                    policy: StepPolicy::Symmetric,
                },
            ),
            usage_today: ValueGuard::new(
                "usage_today",
                GuardLimits {
                    floor: 0.0,
                    ceiling: 5_000.0,
                    max_step: 1_000.0,
                    policy: StepPolicy::AllowsDropToZero,
                },
            ),
            total_gallons: ValueGuard::new(
                "total_gallons",
                GuardLimits {
                    floor: 0.0,
                    ceiling: 10_000_000.0,
                    max_step: 10_000.0,
                    policy: StepPolicy::Monotonic {
                        decrease_tolerance: 10.0,
                    },
                },
            ),
            average_daily_usage: ValueGuard::new(
                "average_daily_usage",
                GuardLimits {
                    floor: 0.0,
                    ceiling: 2_550.0,
                    max_step: 500.0,
                    policy: StepPolicy::Symmetric,
                },
            ),
            last_salt_lbs: None,
            salt_rejected_total: 0,
        }
    }

    /// Checks a salt estimate against the tank capacity.
    ///
    /// Estimates above 110% of capacity come from corrupted refill or regeneration
    /// bytes and are replaced by the last accepted level.
    pub fn check_salt(&mut self, salt_lbs: f64, capacity_lbs: f64) -> Option<f64> {
        if !salt_lbs.is_finite() || salt_lbs > capacity_lbs * SALT_CAPACITY_TOLERANCE {
            warn!(
                salt_lbs,
                capacity_lbs, "salt estimate exceeds tank capacity, keeping last value"
            );
            self.salt_rejected_total += 1;
            return self.last_salt_lbs;
        }
        self.last_salt_lbs = Some(salt_lbs);
        Some(salt_lbs)
    }

    pub fn last_salt_lbs(&self) -> Option<f64> {
        self.last_salt_lbs
    }

    /// Total rejections across every guard.
    pub fn rejected_total(&self) -> u64 {
        self.guards().map(ValueGuard::rejected_total).sum::<u64>() + self.salt_rejected_total
    }

    /// Clears every guard for a new connection. The salt level survives, since the
    /// tank does not change while the link is down.
    pub fn reset_session(&mut self) {
        self.current_flow.reset();
        self.peak_flow.reset();
        self.soft_water_remaining.reset();
        self.usage_today.reset();
        self.total_gallons.reset();
        self.average_daily_usage.reset();
    }

    fn guards(&self) -> impl Iterator<Item = &ValueGuard> {
        [
            &self.current_flow,
            &self.peak_flow,
            &self.soft_water_remaining,
            &self.usage_today,
            &self.total_gallons,
            &self.average_daily_usage,
        ]
        .into_iter()
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_jump_rejected_then_moderate_change_accepted() {
        let mut v = Validators::new();
        assert_eq!(v.current_flow.check(5.0), Some(5.0));
        assert_eq!(v.current_flow.check(25.0), Some(5.0));
        assert_eq!(v.current_flow.check(12.0), Some(12.0));
        assert_eq!(v.current_flow.rejected_total(), 1);
    }

    #[test]
    fn accepted_value_is_idempotent() {
        let mut v = Validators::new();
        assert_eq!(v.soft_water_remaining.check(800.0), Some(800.0));
        assert_eq!(v.soft_water_remaining.check(800.0), Some(800.0));
        assert_eq!(v.soft_water_remaining.last(), Some(800.0));
    }

    #[test]
    fn ceiling_falls_back_to_last_accepted() {
        let mut v = Validators::new();
        assert_eq!(v.peak_flow.check(31.0), None);
        assert_eq!(v.peak_flow.check(4.0), Some(4.0));
        assert_eq!(v.peak_flow.check(31.0), Some(4.0));
        assert_eq!(v.peak_flow.check(f64::NAN), Some(4.0));
    }

    #[test]
    fn drop_to_zero_bypasses_step() {
        let mut v = Validators::new();
        v.usage_today.check(3000.0);
        assert_eq!(v.usage_today.check(0.0), Some(0.0));
        // Symmetric guards do not get the exemption.
        v.soft_water_remaining.check(9000.0);
        assert_eq!(v.soft_water_remaining.check(0.0), Some(9000.0));
    }

    #[test]
    fn monotonic_counter() {
        let mut v = Validators::new();
        assert_eq!(v.total_gallons.check(100_000.0), Some(100_000.0));
        assert_eq!(v.total_gallons.check(99_995.0), Some(99_995.0));
        assert_eq!(v.total_gallons.check(99_900.0), Some(99_995.0));
        assert_eq!(v.total_gallons.check(120_000.0), Some(99_995.0));
        assert_eq!(v.total_gallons.check(109_995.0), Some(109_995.0));
    }

    #[test]
    fn repeated_jumps_never_replace_last_value() {
        let mut v = Validators::new();
        assert_eq!(v.current_flow.check(5.0), Some(5.0));
        for _ in 0..6 {
            assert_eq!(v.current_flow.check(25.0), Some(5.0));
        }
        assert_eq!(v.current_flow.last(), Some(5.0));
        assert_eq!(v.current_flow.rejected_total(), 6);
        assert_eq!(v.current_flow.check(12.0), Some(12.0));
    }

    #[test]
    fn salt_fallback_survives_session_reset() {
        let mut v = Validators::new();
        assert_eq!(v.check_salt(180.0, 312.0), Some(180.0));
        assert_eq!(v.check_salt(3000.0, 312.0), Some(180.0));
        v.current_flow.check(3.0);
        v.reset_session();
        assert_eq!(v.current_flow.last(), None);
        assert_eq!(v.check_salt(3000.0, 312.0), Some(180.0));
        assert_eq!(v.rejected_total(), 2);
    }

    #[test]
    fn salt_without_history_is_none() {
        let mut v = Validators::new();
        assert_eq!(v.check_salt(500.0, 100.0), None);
    }
}
