pub mod bridge;
pub mod calibration;
pub mod command;
pub mod leds;
pub mod mode;
pub mod rpm;
pub mod settings;
pub mod telemetry;
pub mod util;
pub mod wheel;
