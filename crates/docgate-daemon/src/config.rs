//! Configuration loading for docgate-daemon.

use anyhow::{Context, Result};
use docgate_core::ConverterConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 4870;

/// Default listening address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub daemon: Option<DaemonConfig>,
    pub storage: Option<StorageConfig>,
    pub conversion: Option<ConverterConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DaemonConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    pub root: Option<PathBuf>,
}

impl Config {
    pub fn host(&self) -> String {
        self.daemon
            .as_ref()
            .and_then(|d| d.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn port(&self) -> u16 {
        self.daemon
            .as_ref()
            .and_then(|d| d.port)
            .unwrap_or(DEFAULT_PORT)
    }

    /// Scratch root, wiped and recreated at startup.
    pub fn work_dir(&self) -> PathBuf {
        self.daemon
            .as_ref()
            .and_then(|d| d.work_dir.clone())
            .unwrap_or_else(default_work_dir)
    }

    /// Spool directory the filesystem document store serves from.
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.root.clone())
            .unwrap_or_else(default_storage_root)
    }

    pub fn converter(&self) -> ConverterConfig {
        self.conversion.clone().unwrap_or_default()
    }
}

pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("docgate")
}

pub fn default_storage_root() -> PathBuf {
    PathBuf::from("/var/lib/docgate/documents")
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}
