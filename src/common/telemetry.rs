// Telemetry decoding for OutGauge-style datagrams
//
// BeamNG.drive (and other OutGauge emitters) send a fixed-layout struct over
// UDP. Only the engine RPM field is consumed here:
// - bytes [16, 20): little-endian f32 RPM
// Everything else in the packet is ignored.

use thiserror::Error;

/// Byte offset of the RPM field inside an OutGauge packet.
pub const RPM_OFFSET: usize = 16;

/// Smallest datagram that still carries the RPM field.
pub const MIN_PACKET_SIZE: usize = RPM_OFFSET + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("datagram too short: {len} bytes (need at least {})", MIN_PACKET_SIZE)]
    Truncated { len: usize },
}

/// Trait for pulling the RPM reading out of a game's telemetry datagram
pub trait TelemetryParser {
    /// Decode the current engine RPM, or explain why the packet can't be read.
    fn parse_rpm(&self, data: &[u8]) -> Result<f32, TelemetryError>;

    /// Get the minimum packet size this parser accepts
    fn expected_packet_size(&self) -> usize;

    /// Get the game name for logging
    fn game_name(&self) -> &'static str;
}

/// Helper function to read a little-endian f32 at `offset`
fn f32_at(data: &[u8], offset: usize) -> Option<f32> {
    let bytes = data.get(offset..offset + 4)?;
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

/// Checked RPM decode. The value is returned verbatim: no clamping, NaN and
/// infinities pass straight through.
pub fn try_decode_rpm(data: &[u8]) -> Result<f32, TelemetryError> {
    f32_at(data, RPM_OFFSET).ok_or(TelemetryError::Truncated { len: data.len() })
}

/// Decode the RPM field, yielding `f32::NAN` for truncated datagrams.
pub fn decode_rpm(data: &[u8]) -> f32 {
    try_decode_rpm(data).unwrap_or(f32::NAN)
}

/// OutGauge telemetry parser (BeamNG.drive, Live for Speed)
#[derive(Debug, Default, Clone, Copy)]
pub struct OutGaugeParser;

impl TelemetryParser for OutGaugeParser {
    fn parse_rpm(&self, data: &[u8]) -> Result<f32, TelemetryError> {
        try_decode_rpm(data)
    }

    fn expected_packet_size(&self) -> usize {
        MIN_PACKET_SIZE
    }

    fn game_name(&self) -> &'static str {
        "BeamNG.drive (OutGauge)"
    }
}
