use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read configuration file")]
    ReadFailed,
    #[error("failed to write configuration file")]
    WriteFailed,
    #[error("failed to parse configuration file")]
    ParseFailed,
    #[error("no usable configuration directory")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub database: Database,
    pub watchdog: Watchdog,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Watchdog {
    /// Seconds between monitoring runs (when the watchdog is enabled).
    pub run_interval_seconds: u64,
    /// Seconds between decay sweeps (when the watchdog is disabled).
    pub decay_interval_seconds: u64,
    /// Per-probe network timeout in seconds.
    pub probe_timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    pub default_limit: u32,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/portwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("portwatch/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Database { path: "portwatch.db".into() },
            watchdog: Watchdog {
                run_interval_seconds: 30,
                decay_interval_seconds: 60,
                probe_timeout_seconds: 2,
            },
            pagination: Pagination { default_limit: 10 },
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current Internal Configuration State:")?;
        writeln!(f, "  Database")?;
        writeln!(f, "    Path: {}", self.database.path)?;
        writeln!(f, "  Watchdog")?;
        writeln!(f, "    Run Interval: {}s", self.watchdog.run_interval_seconds)?;
        writeln!(f, "    Decay Interval: {}s", self.watchdog.decay_interval_seconds)?;
        writeln!(f, "    Probe Timeout: {}s", self.watchdog.probe_timeout_seconds)?;
        writeln!(f, "  Pagination")?;
        writeln!(f, "    Default Limit: {}", self.pagination.default_limit)?;
        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/portwatch/config.toml
    /// or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(|_err| Error::ReadFailed)?;
            toml::from_str(raw_string.as_str()).map_err(|_err| Error::ParseFailed)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String =
            toml::to_string_pretty(self).map_err(|_err| Error::ParseFailed)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_err| Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(|_err| Error::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // First load writes the defaults.
        let written = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.database.path, written.database.path);
        assert_eq!(reloaded.watchdog.probe_timeout_seconds, 2);
        assert_eq!(reloaded.pagination.default_limit, 10);
    }

    #[test]
    fn extension_is_normalized_to_toml() {
        assert_eq!(
            normalize_toml_path(path::Path::new("/tmp/settings.conf")),
            path::PathBuf::from("/tmp/settings.toml")
        );
        assert_eq!(
            normalize_toml_path(path::Path::new("/tmp/settings.toml")),
            path::PathBuf::from("/tmp/settings.toml")
        );
    }
}
