// src/config.rs
//! Configuration stored as JSON under the user's config directory

use crate::{
    error::{ProximityError, Result},
    geocode::{DEFAULT_GEOCODER_URL, DEFAULT_USER_AGENT},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SOURCE_TYPES: [&str; 3] = ["gpsd", "serial", "replay"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_type: String, // "gpsd", "serial", "replay"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub replay_path: Option<PathBuf>,
    pub replay_interval_ms: u64,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub search_limit: usize,
    /// Player command looped while the alarm rings, e.g. `["paplay", "alarm.oga"]`
    pub alarm_command: Option<Vec<String>>,
    pub alarm_bell: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            replay_path: None,
            replay_interval_ms: 1000,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            geocoder_user_agent: DEFAULT_USER_AGENT.to_string(),
            search_limit: 5,
            alarm_command: None,
            alarm_bell: true,
        }
    }
}

impl AppConfig {
    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProximityError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ProximityError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProximityError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ProximityError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| ProximityError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// `$HOME/.config/proximity-alarm/config.json`
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| ProximityError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("proximity-alarm")
            .join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if !SOURCE_TYPES.contains(&self.source_type.as_str()) {
            return Err(ProximityError::Config(format!(
                "Unknown source type '{}', expected one of {}",
                self.source_type,
                SOURCE_TYPES.join(", ")
            )));
        }
        if self.search_limit == 0 {
            return Err(ProximityError::Config("search_limit must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    pub fn update_replay(&mut self, path: PathBuf, interval_ms: u64) {
        self.source_type = "replay".to_string();
        self.replay_path = Some(path);
        self.replay_interval_ms = interval_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.source_type, "gpsd");
        assert_eq!(config.gpsd_port, Some(2947));
        assert_eq!(config.geocoder_url, DEFAULT_GEOCODER_URL);
        assert!(config.alarm_bell);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_update_serial() {
        let mut config = AppConfig::default();
        config.update_serial("/dev/ttyUSB0".to_string(), 115200);
        assert_eq!(config.source_type, "serial");
        assert_eq!(config.serial_port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(config.serial_baudrate, Some(115200));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.update_replay(PathBuf::from("/tmp/commute.nmea"), 250);
        config.alarm_command = Some(vec!["paplay".to_string(), "alarm.oga".to_string()]);
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"source_type":"serial","serial_port":"/dev/ttyACM0"}"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.source_type, "serial");
        assert_eq!(loaded.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(loaded.search_limit, 5);
    }

    #[test]
    fn test_invalid_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ProximityError::Config(_))));

        std::fs::write(&path, r#"{"source_type":"windows"}"#).unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ProximityError::Config(_))));
    }
}
