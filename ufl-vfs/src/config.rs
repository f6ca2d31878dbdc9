// SPDX-License-Identifier: AGPL-3.0-or-later
//! Layer-wide configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ufl_core::{UflError, UflResult};
use ufl_pool::PoolConfig;
use ufl_providers::RemoteConfig;

/// When resolution opens archives on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicy {
    /// Return a resolved archive file already mounted
    pub auto_mount: bool,
    /// Read the first bytes of extension-less or ambiguous names to pick a
    /// format
    pub sniff_signatures: bool,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            auto_mount: true,
            sniff_signatures: true,
        }
    }
}

/// Everything tunable, one section per concern
///
/// ```toml
/// [pool]
/// max_connections_per_key = 2
///
/// [archive]
/// auto_mount = false
///
/// [remote]
/// io_timeout_secs = 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UflConfig {
    pub pool: PoolConfig,
    pub archive: ArchivePolicy,
    pub remote: RemoteConfig,
}

impl UflConfig {
    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "hyperpolymath", "ufl")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml(text: &str) -> UflResult<Self> {
        toml::from_str(text).map_err(|e| UflError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> UflResult<String> {
        toml::to_string_pretty(self).map_err(|e| UflError::Config(e.to_string()))
    }

    /// Read `path`, which must exist
    pub fn load_from(path: &Path) -> UflResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| UflError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Read an explicit path, or the default path when it exists, or fall
    /// back to defaults
    pub fn load(path: Option<&Path>) -> UflResult<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }
}
