use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::filter::FilterInput;
use crate::domain::projector::DEFAULT_WRAP_WIDTH;
use crate::domain::scheduler::DEFAULT_REFRESH_INTERVAL;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub view: ViewConfig,
    /// Named daemons for the client commands.
    #[serde(default)]
    pub nodes: HashMap<String, NodeTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    pub ingest_queue: usize,
    /// Preferences file; defaults to `preferences.toml` next to the config.
    pub preferences_file: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9200".to_string(),
            log_level: "info".to_string(),
            ingest_queue: 256,
            preferences_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub refresh_interval_ms: u64,
    pub wrap_width: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl ViewConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTarget {
    pub url: String,
}

impl Config {
    pub fn dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("fleet-top"))
    }

    pub fn path() -> Result<PathBuf> {
        Ok(Self::dir()?.join("config.toml"))
    }
}

/// Load the default config file, if any, layered with `FLEET_TOP_*`
/// environment variables (`FLEET_TOP_DAEMON__HTTP_ADDR`, ...).
pub fn load() -> Result<Config> {
    load_from(&Config::path()?)
}

pub fn load_from(path: &Path) -> Result<Config> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEET_TOP_").split("__"))
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))
}

/// Filter settings restored at startup and saved at shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub filter: FilterInput,
}

impl Preferences {
    pub fn path(daemon: &DaemonConfig) -> Result<PathBuf> {
        match &daemon.preferences_file {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Config::dir()?.join("preferences.toml")),
        }
    }

    /// Missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serializing preferences")?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
