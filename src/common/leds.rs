// Rev-light output
//
// The wheel has five LEDs (green, green, orange, orange, red). A level in
// [0, 1] lights a proportional number of them from the left.

use hidapi::{HidDevice, HidResult};
use tracing::trace;

use crate::common::rpm::FeedbackCommand;
use crate::common::wheel::WheelDevice;

pub const LED_COUNT: u8 = 5;
pub const ALL_LEDS: u8 = 0b1_1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pedal {
    Gas,
    Brake,
    Clutch,
}

impl Pedal {
    pub const ALL: [Pedal; 3] = [Pedal::Gas, Pedal::Brake, Pedal::Clutch];

    pub fn name(&self) -> &'static str {
        match self {
            Pedal::Gas => "gas",
            Pedal::Brake => "brake",
            Pedal::Clutch => "clutch",
        }
    }
}

/// Where LED commands and pedal readouts end up.
pub trait FeedbackSink {
    fn set_leds(&mut self, command: FeedbackCommand);

    /// Pedal readout while testing. Only the gas pedal also moves the LEDs,
    /// and that goes through `set_leds`.
    fn pedal(&mut self, pedal: Pedal, value: f32) {
        trace!(pedal = pedal.name(), percent = value * 100.0, "pedal");
    }

    /// Ask for the current pedal positions again, even if they have not moved.
    fn resend_pedals(&mut self) {}
}

/// Bitmask of lit LEDs for a level. Out-of-range and NaN levels clamp.
pub fn led_mask(level: f32) -> u8 {
    if level.is_nan() || level <= 0.0 {
        return 0;
    }
    let lit = (level.min(1.0) * f32::from(LED_COUNT)).round() as u8;
    ALL_LEDS >> (LED_COUNT - lit.min(LED_COUNT))
}

/// HID output report for the rev-lights. Byte 0 is the (unused) report id.
pub fn build_leds_report(mask: u8) -> [u8; 8] {
    [0x00, 0xF8, 0x12, mask & ALL_LEDS, 0x00, 0x00, 0x00, 0x01]
}

pub struct Leds<D = HidDevice> {
    device: D,
    current: Option<u8>,
}

impl<D: WheelDevice> Leds<D> {
    pub fn new(device: D) -> Self {
        Leds {
            device,
            current: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Write the mask unless the wheel already shows it.
    pub fn set_mask(&mut self, mask: u8) -> HidResult<()> {
        if self.current == Some(mask) {
            return Ok(());
        }
        self.device.write(&build_leds_report(mask))?;
        self.current = Some(mask);
        Ok(())
    }

    pub fn current(&self) -> Option<u8> {
        self.current
    }

    pub fn off(&mut self) -> HidResult<()> {
        self.set_mask(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_fills_from_the_left() {
        assert_eq!(led_mask(0.0), 0b00000);
        assert_eq!(led_mask(0.2), 0b00001);
        assert_eq!(led_mask(0.4), 0b00011);
        assert_eq!(led_mask(0.5), 0b00111);
        assert_eq!(led_mask(0.8), 0b01111);
        assert_eq!(led_mask(1.0), 0b11111);
    }

    #[test]
    fn mask_clamps_out_of_range_levels() {
        assert_eq!(led_mask(-0.75), 0);
        assert_eq!(led_mask(f32::NAN), 0);
        assert_eq!(led_mask(1.5), ALL_LEDS);
        assert_eq!(led_mask(f32::INFINITY), ALL_LEDS);
    }

    #[test]
    fn blink_commands_toggle_everything() {
        let on = FeedbackCommand::Blink { on: true };
        let off = FeedbackCommand::Blink { on: false };
        assert_eq!(led_mask(on.level()), ALL_LEDS);
        assert_eq!(led_mask(off.level()), 0);
    }

    #[test]
    fn report_layout() {
        let expected = [0x00, 0xF8, 0x12, 0x07, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(build_leds_report(0b00111), expected);
        // high bits never reach the wheel
        assert_eq!(build_leds_report(0xFF)[3], ALL_LEDS);
    }
}
