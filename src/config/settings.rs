//! User settings loaded from ~/.feedbacks/settings.yaml.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// User settings for the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ticks per second when driving a composite from the CLI.
    pub tick_rate: f64,
    /// Seed used when a config does not set one.
    pub seed: Option<u64>,
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            seed: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// The standard settings path, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::home_dir()?;
        path.push(".feedbacks");
        path.push("settings.yaml");
        Some(path)
    }

    /// Load from the standard path, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Seconds per tick. Non-positive rates fall back to 60 Hz.
    pub fn tick(&self) -> f64 {
        if self.tick_rate.is_finite() && self.tick_rate > 0.0 {
            1.0 / self.tick_rate
        } else {
            1.0 / 60.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.tick_rate, 60.0);
        assert_eq!(s.log_level, "warn");
        assert!(s.seed.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tick_rate: 8").unwrap();
        let s = Settings::load_from(file.path()).unwrap();
        assert_eq!(s.tick(), 0.125);
        assert_eq!(s.log_level, "warn");
    }

    #[test]
    fn bad_tick_rate_falls_back() {
        let s = Settings {
            tick_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(s.tick(), 1.0 / 60.0);
    }

    #[test]
    fn load_never_panics() {
        let _ = Settings::load();
    }
}
