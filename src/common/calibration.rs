// Max RPM ceiling tracking
//
// The ceiling starts from settings, can be replaced from the console at any
// time, and is bumped automatically when telemetry revs past it.

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_RPM: f32 = 7000.0;

/// Granularity of automatic recalibration.
const RECALIBRATION_STEP: f32 = 1000.0;

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("max RPM must be a positive finite number, got {0}")]
    InvalidMaxRpm(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recalibration {
    pub changed: bool,
    pub max_rpm: f32,
}

#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    max_rpm: f32,
}

impl Default for CalibrationTracker {
    fn default() -> Self {
        Self {
            max_rpm: DEFAULT_MAX_RPM,
        }
    }
}

fn check_max_rpm(value: f32) -> Result<f32, CalibrationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CalibrationError::InvalidMaxRpm(value))
    }
}

impl CalibrationTracker {
    pub fn new(max_rpm: f32) -> Result<Self, CalibrationError> {
        Ok(Self {
            max_rpm: check_max_rpm(max_rpm)?,
        })
    }

    pub fn max_rpm(&self) -> f32 {
        self.max_rpm
    }

    /// Raise the ceiling when `current_rpm` overshoots it, rounding up to the
    /// next thousand. Non-finite readings are ignored.
    pub fn observe(&mut self, current_rpm: f32) -> Recalibration {
        if !current_rpm.is_finite() || current_rpm / self.max_rpm <= 1.0 {
            return self.unchanged();
        }

        let adjusted = (current_rpm / RECALIBRATION_STEP).ceil() * RECALIBRATION_STEP;
        if !adjusted.is_finite() || adjusted <= self.max_rpm {
            return self.unchanged();
        }

        warn!(
            current_rpm,
            old_max_rpm = self.max_rpm,
            new_max_rpm = adjusted,
            "Max RPM is set too low, adjusting"
        );
        self.max_rpm = adjusted;
        Recalibration {
            changed: true,
            max_rpm: adjusted,
        }
    }

    /// Replace the ceiling with an operator-supplied value. Returns whether the
    /// ceiling actually changed; invalid values leave it untouched.
    pub fn set_manual(&mut self, max_rpm: f32) -> Result<bool, CalibrationError> {
        let max_rpm = check_max_rpm(max_rpm)?;
        let changed = max_rpm != self.max_rpm;
        self.max_rpm = max_rpm;
        Ok(changed)
    }

    fn unchanged(&self) -> Recalibration {
        Recalibration {
            changed: false,
            max_rpm: self.max_rpm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overshoot_rounds_up_to_next_thousand() -> Result<(), CalibrationError> {
        let mut tracker = CalibrationTracker::new(7000.0)?;
        let result = tracker.observe(7350.0);
        assert_eq!(
            result,
            Recalibration {
                changed: true,
                max_rpm: 8000.0
            }
        );
        assert_eq!(tracker.max_rpm(), 8000.0);
        Ok(())
    }

    #[test]
    fn readings_at_or_below_ceiling_leave_it_alone() {
        let mut tracker = CalibrationTracker::default();
        assert!(!tracker.observe(7000.0).changed);
        assert!(!tracker.observe(3500.0).changed);
        assert!(!tracker.observe(-5250.0).changed);
        assert_eq!(tracker.max_rpm(), DEFAULT_MAX_RPM);
    }

    #[test]
    fn exact_thousand_overshoot() -> Result<(), CalibrationError> {
        let mut tracker = CalibrationTracker::new(6500.0)?;
        assert_eq!(tracker.observe(9000.0).max_rpm, 9000.0);
        Ok(())
    }

    #[test]
    fn non_finite_readings_are_ignored() {
        let mut tracker = CalibrationTracker::default();
        assert!(!tracker.observe(f32::INFINITY).changed);
        assert!(!tracker.observe(f32::NAN).changed);
        assert_eq!(tracker.max_rpm(), DEFAULT_MAX_RPM);
    }

    #[test]
    fn manual_override_replaces_ceiling() -> Result<(), CalibrationError> {
        let mut tracker = CalibrationTracker::default();
        assert!(tracker.set_manual(5500.0)?);
        assert_eq!(tracker.max_rpm(), 5500.0);
        // manual values don't have to be whole thousands, and can go down
        assert!(tracker.set_manual(812.5)?);
        assert_eq!(tracker.max_rpm(), 812.5);
        Ok(())
    }

    #[test]
    fn repeated_manual_value_reports_no_change() -> Result<(), CalibrationError> {
        let mut tracker = CalibrationTracker::default();
        assert!(tracker.set_manual(9000.0)?);
        assert!(!tracker.set_manual(9000.0)?);
        assert!(!tracker.set_manual(9000.0)?);
        assert_eq!(tracker.max_rpm(), 9000.0);
        Ok(())
    }

    #[test]
    fn invalid_manual_values_keep_prior_ceiling() {
        let mut tracker = CalibrationTracker::default();
        for bad in [0.0, -100.0, f32::NAN, f32::INFINITY] {
            assert!(tracker.set_manual(bad).is_err(), "{bad} accepted");
        }
        assert_eq!(tracker.max_rpm(), DEFAULT_MAX_RPM);
    }

    #[test]
    fn rejects_invalid_initial_ceiling() {
        assert_eq!(
            CalibrationTracker::new(0.0).err(),
            Some(CalibrationError::InvalidMaxRpm(0.0))
        );
    }
}
