use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_CONFIG_PATH: &str = "config/entsync.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_rate_hz: u32,
    /// Chunk radius within which observers track entities.
    pub view_distance_chunks: u32,
    /// Ticks the demo runs before shutting down.
    pub demo_ticks: u64,
    /// Zombies spawned by the demo.
    pub demo_zombies: u32,
    /// Seed for the demo's attribute churn.
    pub seed: u64,
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            view_distance_chunks: 4,
            demo_ticks: 40,
            demo_zombies: 3,
            seed: 1337,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist. Runs before logging
    /// is installed, so failures are returned rather than logged.
    pub fn try_load_from_path(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let config = toml::from_str::<ServerConfig>(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config.sanitized()))
    }

    /// Save configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        self.tick_rate_hz = self.tick_rate_hz.clamp(1, 1000);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let loaded = ServerConfig::try_load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/entsync.toml");
        let config = ServerConfig {
            view_distance_chunks: 9,
            log_filter: "debug,entsync_net=trace".to_string(),
            ..ServerConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(ServerConfig::try_load_from_path(&path).unwrap(), Some(config));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entsync.toml");
        fs::write(&path, "demo_zombies = 7\ntick_rate_hz = 0\n").unwrap();
        let config = ServerConfig::try_load_from_path(&path).unwrap().unwrap();
        assert_eq!(config.demo_zombies, 7);
        assert_eq!(config.tick_rate_hz, 1);
        assert_eq!(config.view_distance_chunks, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entsync.toml");
        fs::write(&path, "demo_zombies = \"many\"").unwrap();
        assert!(ServerConfig::try_load_from_path(&path).is_err());
    }
}
