//! Configuration schema for Depot
//!
//! Configuration is stored at `~/.config/depot/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Network settings
    pub network: NetworkConfig,

    /// Remote sources, tried in declaration order
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            repositories: RepositoryConfig::standard(),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable the provisioning journal
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { journal: true }
    }
}

/// Artifact cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory override (default: `~/.cache/depot/libs`)
    pub dir: Option<PathBuf>,
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// One remote source.
///
/// `file://` URLs map to directory-backed sources; anything else is
/// fetched over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Short name used in log lines
    pub name: String,

    /// Base location; the descriptor's repository path is appended
    pub url: String,
}

impl RepositoryConfig {
    /// The standard ordered mirror pair, tried first to last
    pub fn standard() -> Vec<Self> {
        vec![
            Self {
                name: "central".to_string(),
                url: "https://repo.depot-mirror.dev/release/".to_string(),
            },
            Self {
                name: "fallback".to_string(),
                url: "https://libs.depot-mirror.dev/release/".to_string(),
            },
        ]
    }
}
