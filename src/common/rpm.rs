// RPM to rev-light mapping
//
// Three tiers relative to the current ceiling:
// - below the blink threshold: LEDs fill proportionally
// - threshold up to redline: solid full
// - at or past redline: square-wave blink sampled from the wall clock

use std::fmt;

/// What the rev-lights should show for one reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedbackCommand {
    /// Proportional fill, 0.0 to 1.0
    Intensity(f32),
    /// Over-redline flash phase
    Blink { on: bool },
}

impl FeedbackCommand {
    pub const OFF: FeedbackCommand = FeedbackCommand::Intensity(0.0);

    /// LED level handed to the wheel.
    pub fn level(&self) -> f32 {
        match *self {
            FeedbackCommand::Intensity(level) => level.clamp(0.0, 1.0),
            FeedbackCommand::Blink { on: true } => 1.0,
            FeedbackCommand::Blink { on: false } => 0.0,
        }
    }
}

/// Non-fatal problems with a reading. The LEDs are switched off and the
/// bridge keeps running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapWarning {
    Negative { fraction: f32 },
    NotANumber,
}

impl fmt::Display for MapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapWarning::Negative { fraction } => write!(
                f,
                "invalid RPM fraction {fraction:.2}, RPM fractions should be between 0 and 1"
            ),
            MapWarning::NotANumber => write!(f, "RPM fraction is not a number"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOutcome {
    pub command: FeedbackCommand,
    pub fraction: f32,
    pub warning: Option<MapWarning>,
    /// Reading is past the ceiling; the calibration tracker should catch up.
    pub recalibrate: bool,
}

pub fn rpm_fraction(current_rpm: f32, max_rpm: f32) -> f32 {
    current_rpm / max_rpm
}

/// Flash phase for `now_ms`: on for the first half of every
/// `2 * flash_interval_ms` period. A zero interval never turns off.
pub fn blink_on(now_ms: u64, flash_interval_ms: u64) -> bool {
    if flash_interval_ms == 0 {
        return true;
    }
    now_ms % flash_interval_ms.saturating_mul(2) < flash_interval_ms
}

pub fn map_rpm(
    current_rpm: f32,
    max_rpm: f32,
    blink_threshold: f32,
    flash_interval_ms: u64,
    now_ms: u64,
) -> MapOutcome {
    let fraction = rpm_fraction(current_rpm, max_rpm);

    let (command, warning) = if fraction.is_nan() {
        (FeedbackCommand::OFF, Some(MapWarning::NotANumber))
    } else if fraction < 0.0 {
        (
            FeedbackCommand::OFF,
            Some(MapWarning::Negative { fraction }),
        )
    } else if fraction < blink_threshold.min(1.0) {
        (FeedbackCommand::Intensity(fraction), None)
    } else if fraction < 1.0 {
        (FeedbackCommand::Intensity(1.0), None)
    } else {
        let on = blink_on(now_ms, flash_interval_ms);
        (FeedbackCommand::Blink { on }, None)
    };

    MapOutcome {
        command,
        fraction,
        warning,
        recalibrate: fraction > 1.0,
    }
}
