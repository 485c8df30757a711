//! Configuration file management for v2x-tracker.
//!
//! Reads/writes `~/.v2x-tracker/config.yaml` with tracker timeouts, the
//! DSRC association range, eviction policy and log level.

use std::path::PathBuf;

use crate::maps::{DSRC_RANGE_M, MAP_TIMEOUT};
use crate::registry::{EvictionMode, VEHICLE_TIMEOUT};
use crate::spat::SPAT_TIMEOUT;
use crate::types::V2xError;

/// Full configuration structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Seconds without a BSM before a vehicle is evicted
    pub vehicle_timeout: f64,
    /// Vehicle to map reference point distance for association
    pub dsrc_range_m: f64,
    /// Seconds without a rebroadcast before a map is dropped
    pub map_timeout: f64,
    /// Seconds before a cached SPaT is considered stale
    pub spat_timeout: f64,
    pub eviction: EvictionMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            vehicle_timeout: VEHICLE_TIMEOUT,
            dsrc_range_m: DSRC_RANGE_M,
            map_timeout: MAP_TIMEOUT,
            spat_timeout: SPAT_TIMEOUT,
            eviction: EvictionMode::All,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".into(),
        }
    }
}

/// Get the config directory path (`~/.v2x-tracker/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".v2x-tracker")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.v2x-tracker/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            log::warn!("cannot read {}: {e}", path.display());
            Config::default()
        }
    }
}

/// Save config to `~/.v2x-tracker/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, V2xError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| V2xError::Config(e.to_string()))?;

    let path = config_file();
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| V2xError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys and bad values keep defaults.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        // Trailing comments
        let line = line.split('#').next().unwrap_or("");
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        match current_section.as_deref() {
            Some("tracker") => {
                let t = &mut config.tracker;
                match key {
                    "vehicle_timeout" => set_positive(&mut t.vehicle_timeout, val),
                    "dsrc_range_m" => set_positive(&mut t.dsrc_range_m, val),
                    "map_timeout" => set_positive(&mut t.map_timeout, val),
                    "spat_timeout" => set_positive(&mut t.spat_timeout, val),
                    "eviction" => {
                        if let Some(mode) =
                            parse_string_value(val).and_then(|v| EvictionMode::from_name(&v))
                        {
                            t.eviction = mode;
                        }
                    }
                    _ => {}
                }
            }
            Some("logging") => {
                if key == "level" {
                    if let Some(v) = parse_string_value(val) {
                        config.logging.level = v;
                    }
                }
            }
            _ => {}
        }
    }

    config
}

fn set_positive(slot: &mut f64, val: &str) {
    if let Some(v) = parse_float_value(val).filter(|v| *v > 0.0) {
        *slot = v;
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if (val.starts_with('"') && val.ends_with('"') && val.len() >= 2)
        || (val.starts_with('\'') && val.ends_with('\'') && val.len() >= 2)
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let t = &config.tracker;
    let lines = [
        "# v2x-tracker configuration".to_string(),
        String::new(),
        "tracker:".into(),
        format!("  vehicle_timeout: {:?}", t.vehicle_timeout),
        format!("  dsrc_range_m: {:?}", t.dsrc_range_m),
        format!("  map_timeout: {:?}", t.map_timeout),
        format!("  spat_timeout: {:?}", t.spat_timeout),
        format!("  eviction: {}", t.eviction.as_str()),
        String::new(),
        "logging:".into(),
        format!("  level: \"{}\"", config.logging.level),
    ];
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
