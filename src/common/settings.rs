// Settings persistence for the OutGauge LED bridge
//
// Handles loading/saving of user preferences:
// - UDP listen address and port
// - Initial max RPM
// - Blink threshold and flash interval
// - Persistent storage to <config dir>/outgauge-g29-leds/settings.toml
// - CLI argument override support

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::common::calibration::{CalibrationError, CalibrationTracker, DEFAULT_MAX_RPM};

/// BeamNG.drive's default OutGauge port
pub const DEFAULT_PORT: u16 = 4444;
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// Five blinks a second
pub const DEFAULT_FLASH_INTERVAL_MS: u64 = 100;
pub const DEFAULT_BLINK_THRESHOLD: f32 = 0.9;

const CONFIG_DIR_NAME: &str = "outgauge-g29-leds";
const CONFIG_FILE_NAME: &str = "settings.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not find config directory")]
    NoConfigDir,
    #[error("cannot access settings file")]
    Io(#[from] io::Error),
    #[error("cannot parse settings file")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize settings")]
    Serialize(#[from] toml::ser::Error),
    #[error("port must not be 0")]
    InvalidPort,
    #[error("flash interval must be at least 1 ms")]
    InvalidFlashInterval,
    #[error("blink threshold must be in (0, 1], got {0}")]
    InvalidBlinkThreshold(f32),
    #[error(transparent)]
    InvalidMaxRpm(#[from] CalibrationError),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub address: IpAddr,
    pub port: u16,
    pub max_rpm: f32,
    pub verbose: bool,
    pub flash_interval_ms: u64,
    pub blink_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
            max_rpm: DEFAULT_MAX_RPM,
            verbose: false,
            flash_interval_ms: DEFAULT_FLASH_INTERVAL_MS,
            blink_threshold: DEFAULT_BLINK_THRESHOLD,
        }
    }
}

/// Command line values that win over the settings file
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    pub max_rpm: Option<f32>,
    pub verbose: bool,
    pub flash_interval_ms: Option<u64>,
    pub blink_threshold: Option<f32>,
}

impl Settings {
    /// Get the settings file path in the user's config directory
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        Ok(path)
    }

    /// Load settings from the config file, or return defaults if it is
    /// missing or unreadable
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) if path.exists() => match Self::load_from(&path) {
                Ok(settings) => {
                    info!(path = %path.display(), "loaded settings");
                    return settings;
                }
                Err(err) => warn!(path = %path.display(), %err, "error reading settings file"),
            },
            Ok(_) => {}
            Err(err) => warn!(%err, "error accessing config directory"),
        }

        info!("using default settings");
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save settings to the config file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(address) = overrides.address {
            self.address = address;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(max_rpm) = overrides.max_rpm {
            self.max_rpm = max_rpm;
        }
        self.verbose |= overrides.verbose;
        if let Some(interval) = overrides.flash_interval_ms {
            self.flash_interval_ms = interval;
        }
        if let Some(threshold) = overrides.blink_threshold {
            self.blink_threshold = threshold;
        }
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.port == 0 {
            return Err(SettingsError::InvalidPort);
        }
        if self.flash_interval_ms == 0 {
            return Err(SettingsError::InvalidFlashInterval);
        }
        if !(self.blink_threshold > 0.0 && self.blink_threshold <= 1.0) {
            return Err(SettingsError::InvalidBlinkThreshold(self.blink_threshold));
        }
        CalibrationTracker::new(self.max_rpm)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_beamng_outgauge() {
        let settings = Settings::default();
        let expected: SocketAddr = "127.0.0.1:4444".parse().unwrap();
        assert_eq!(settings.listen_addr(), expected);
        assert_eq!(settings.max_rpm, 7000.0);
        assert_eq!(settings.flash_interval_ms, 100);
        assert_eq!(settings.blink_threshold, 0.9);
        assert!(!settings.verbose);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let settings = Settings::default().with_overrides(SettingsOverrides {
            port: Some(5555),
            max_rpm: Some(8500.0),
            verbose: true,
            ..Default::default()
        });
        assert_eq!(settings.port, 5555);
        assert_eq!(settings.max_rpm, 8500.0);
        assert!(settings.verbose);
        assert_eq!(settings.address, DEFAULT_ADDRESS);
        assert_eq!(settings.blink_threshold, DEFAULT_BLINK_THRESHOLD);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases: [fn(&mut Settings); 6] = [
            |s| s.port = 0,
            |s| s.flash_interval_ms = 0,
            |s| s.blink_threshold = 0.0,
            |s| s.blink_threshold = 1.2,
            |s| s.blink_threshold = f32::NAN,
            |s| s.max_rpm = -1.0,
        ];
        for break_setting in cases {
            let mut settings = Settings::default();
            break_setting(&mut settings);
            assert!(settings.validate().is_err(), "{settings:?} accepted");
        }
    }

    #[test]
    fn save_and_load_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let settings = Settings {
            port: 4445,
            blink_threshold: 0.85,
            ..Default::default()
        };
        settings.save_to(&path)?;
        assert_eq!(Settings::load_from(&path)?, settings);
        Ok(())
    }

    #[test]
    fn partial_file_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "max_rpm = 9000.0\naddress = \"0.0.0.0\"\n")?;
        let settings = Settings::load_from(&path)?;
        assert_eq!(settings.max_rpm, 9000.0);
        assert_eq!(settings.address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(settings.port, DEFAULT_PORT);
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "port = \"not a number\"")?;
        let loaded = Settings::load_from(&path);
        assert!(matches!(loaded, Err(SettingsError::Parse(_))));
        Ok(())
    }
}
