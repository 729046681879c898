//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// TOML configuration file contents.
///
/// All fields are optional; anything missing falls back to compiled
/// defaults or environment variables at the call site.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Library root folder containing one directory per system
    pub root_folder: Option<String>,
    /// HTTP listen address, e.g. "127.0.0.1:5780"
    pub listen_addr: Option<String>,
    /// Lookup service settings
    #[serde(default)]
    pub scraper: ScraperConfig,
    /// Per-system platform overrides, keyed by system directory name
    #[serde(default)]
    pub platforms: HashMap<String, PlatformOverride>,
}

/// Lookup service credentials and endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScraperConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// TOML override for one platform table row
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformOverride {
    pub display_name: Option<String>,
    pub maker: Option<String>,
    pub year: Option<String>,
    pub core: Option<String>,
    pub firmware: Option<String>,
    pub lookup_id: Option<u32>,
}

impl TomlConfig {
    /// Load configuration from the default platform config path.
    ///
    /// A missing file is not an error; it yields the default (empty)
    /// configuration. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Parse configuration from a string (used by tests and `--config`)
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Default configuration file path for the platform.
///
/// Linux prefers `~/.config/romkeep/config.toml` and falls back to
/// `/etc/romkeep/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("romkeep").join("config.toml"));
    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/romkeep/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    user_config
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `ROMKEEP_ROOT` environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("ROMKEEP_ROOT") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("romkeep"))
        .unwrap_or_else(|| PathBuf::from("./romkeep_data"))
}
