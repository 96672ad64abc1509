//! Configuration types and loading
//!
//! The config file is optional: without one every setting takes its default.
//! Config path precedence: `--config` > `KEYPOOL_CONFIG` env var > none.
//! Snapshot path precedence: `--state` > `KEYPOOL_STATE_PATH` env var >
//! `pool.state_path` in the config file > `~/.gemini-cli-plus/api-keys.json`.

use key_pool::RotationConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "KEYPOOL_CONFIG";

/// Env var naming the pool snapshot file.
pub const STATE_PATH_ENV: &str = "KEYPOOL_STATE_PATH";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

/// Pool snapshot settings
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Snapshot file; defaults to the per-user location when unset
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| common::Error::io(path, e))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the resolved path, or fall back to defaults when there is none.
    pub fn load_or_default(path: Option<&Path>) -> common::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> common::Result<()> {
        if self.rotation.check_interval == 0 {
            return Err(common::Error::Config(
                "rotation.check_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or KEYPOOL_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(p.to_path_buf());
        }
        std::env::var_os(CONFIG_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Resolve the pool snapshot path.
    pub fn state_path(&self, cli_path: Option<&Path>) -> common::Result<PathBuf> {
        if let Some(p) = cli_path {
            return Ok(p.to_path_buf());
        }
        if let Some(p) = std::env::var_os(STATE_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(p));
        }
        if let Some(p) = &self.pool.state_path {
            return Ok(p.clone());
        }
        default_state_path()
    }
}

/// `~/.gemini-cli-plus/api-keys.json`, shared with the dashboard that reads the same file.
pub fn default_state_path() -> common::Result<PathBuf> {
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| common::Error::Config("could not determine home directory".into()))?;
    Ok(dirs.home_dir().join(".gemini-cli-plus").join("api-keys.json"))
}
