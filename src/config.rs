//! JSON configuration shared with the tray applet and settings dialog.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::schedule::{Temperatures, Window};

pub const APP_DIR: &str = "redshift-scheduler";
pub const CONFIG_FILE: &str = "config.json";

// Range accepted by redshift itself
pub const MIN_TEMPERATURE: u32 = 1000;
pub const MAX_TEMPERATURE: u32 = 25000;

/// Coordinates kept in the file for other tools. The scheduler uses fixed
/// clock times and ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

// Written into newly created files only
pub const DEFAULT_LOCATION: Location = Location { lat: 50.0, lon: 15.0 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub schedule: Window,
    pub temps: Temperatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            schedule: Window::default(),
            temps: Temperatures::default(),
            location: None,
        }
    }
}

impl Config {
    /// Contents of a freshly created config file. Unlike [`Config::default`],
    /// which stands in for missing keys, this also fills in a location.
    pub fn initial() -> Config {
        Config {
            location: Some(DEFAULT_LOCATION),
            ..Config::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(SchedulerError::ConfigMissing(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|e| SchedulerError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Config::from_json(&contents)
    }

    /// Load, or fall back to defaults when the file does not exist yet.
    /// Any other failure is returned.
    pub fn load_or_default(path: &Path) -> Result<Config> {
        match Config::load(path) {
            Err(SchedulerError::ConfigMissing(_)) => Ok(Config::default()),
            other => other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_temperature("day", self.temps.day)?;
        validate_temperature("night", self.temps.night)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        write_atomic(path, json.as_bytes())?;
        debug!("Saved config to {:?}", path);
        Ok(())
    }
}

pub fn validate_temperature(field: &'static str, value: u32) -> Result<u32> {
    if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value) {
        Ok(value)
    } else {
        Err(SchedulerError::InvalidTemperature {
            field,
            value,
            min: MIN_TEMPERATURE,
            max: MAX_TEMPERATURE,
        })
    }
}

/// `$XDG_CONFIG_HOME/redshift-scheduler/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Write to a sibling temp file then rename over the target, so readers
/// never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SchedulerError::FileWrite { path, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err(parent))?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
    file.write_all(contents).map_err(write_err(&temp_path))?;
    file.sync_all().map_err(write_err(&temp_path))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(write_err(path))?;
    Ok(())
}

/// Where the controller gets its configuration from on every tick.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigSource {
    fn load(&mut self) -> Result<Config>;
}

/// Reads the JSON file fresh on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&mut self) -> Result<Config> {
        Config::load(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimeOfDay;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.enabled);
        assert_eq!(config.schedule.to_string(), "21:00-08:00");
        assert_eq!(config.temps, Temperatures { day: 5800, night: 4800 });
        assert!(config.location.is_none());
    }

    #[test]
    fn test_initial_file_carries_location() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        Config::initial().save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""lat": 50.0"#));
        assert!(raw.contains(r#""lon": 15.0"#));

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.location, Some(DEFAULT_LOCATION));
        assert_eq!(loaded.schedule, Window::default());
        assert_eq!(loaded.temps, Temperatures::default());
    }

    #[test]
    fn test_parse_full_file() {
        let json = r#"{
            "enabled": false,
            "schedule": {"start": "22:15", "stop": "06:30"},
            "temps": {"day": 6500, "night": 3500},
            "location": {"lat": 50.0, "lon": 15.0}
        }"#;
        let config = Config::from_json(json).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.schedule.start, TimeOfDay::hm(22, 15));
        assert_eq!(config.schedule.stop, TimeOfDay::hm(6, 30));
        assert_eq!(config.temps.night, 3500);
        assert_eq!(config.location, Some(Location { lat: 50.0, lon: 15.0 }));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = Config::from_json(r#"{"enabled": false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.schedule, Window::default());
        assert_eq!(config.temps, Temperatures::default());

        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = Config::from_json(r#"{"enabled": false, "temps": {"night": 3000}}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.temps, Temperatures { day: 5800, night: 3000 });

        let config = Config::from_json(r#"{"schedule": {"start": "22:00"}}"#).unwrap();
        assert_eq!(config.schedule.start, TimeOfDay::hm(22, 0));
        assert_eq!(config.schedule.stop, TimeOfDay::hm(8, 0));

        let config = Config::from_json(r#"{"schedule": {"stop": "06:30"}, "temps": {}}"#).unwrap();
        assert_eq!(config.schedule, Window::new(TimeOfDay::hm(21, 0), TimeOfDay::hm(6, 30)));
        assert_eq!(config.temps, Temperatures::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let bad_time = r#"{"schedule": {"start": "21:00", "stop": "8"}}"#;
        assert!(Config::from_json(bad_time).unwrap_err().is_config_error());

        let bad_temp = r#"{"temps": {"day": 5800, "night": 0}}"#;
        match Config::from_json(bad_temp) {
            Err(SchedulerError::InvalidTemperature { field, value, .. }) => {
                assert_eq!(field, "night");
                assert_eq!(value, 0);
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(Config::from_json("not json").unwrap_err().is_config_error());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert!(matches!(Config::load(&path), Err(SchedulerError::ConfigMissing(_))));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_save_then_load_keeps_location() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.enabled = false;
        config.location = Some(Location { lat: 52.2, lon: 21.0 });
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_file_name("config.json.tmp").exists());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""start": "21:00""#));
    }

    #[test]
    fn test_file_source_reads_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut source = FileConfigSource::new(&path);

        assert!(source.load().is_err());

        fs::write(&path, r#"{"enabled": true}"#).unwrap();
        assert!(source.load().unwrap().enabled);

        fs::write(&path, r#"{"enabled": false}"#).unwrap();
        assert!(!source.load().unwrap().enabled);
    }

    #[test]
    fn test_default_path() {
        let path = default_config_path();
        assert!(path.ends_with("redshift-scheduler/config.json"));
    }
}
