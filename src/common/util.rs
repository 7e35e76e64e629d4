// Shared error type and device identifiers

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::common::settings::SettingsError;
use crate::common::wheel::WheelError;

pub const LOGITECH_VID: u16 = 0x046D;
pub const G29_PID: u16 = 0xC24F;
pub const G27_PID: u16 = 0xC29B;

/// Wheels whose rev-lights we know how to drive, in lookup order.
pub const SUPPORTED_WHEELS: [(u16, &str); 2] =
    [(G29_PID, "Logitech G29"), (G27_PID, "Logitech G27")];

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("problem with UDP socket")]
    Transport(#[source] io::Error),
    #[error(transparent)]
    Wheel(#[from] WheelError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type BridgeResult<T = ()> = Result<T, BridgeError>;

/// Wall-clock milliseconds, used to phase the over-redline blink.
pub fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
