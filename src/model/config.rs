use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::broker::ResponseRouting;
use crate::plugin::manifest::PluginDescriptor;

const DEFAULTS: &str = include_str!("../../config/default.toml");

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub log_filter: String,
}

#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    pub response_routing: ResponseRouting,
    pub config_namespace: String,
    pub config_root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub title: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PluginConfig {
    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(self.title.clone(), self.url.clone())
    }
}

fn default_enabled() -> bool {
    true
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let user_path = directories::ProjectDirs::from("", "", "switchboard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists());

        match user_path {
            Some(path) => Self::load_from(&path),
            None => Self::from_layers(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let user = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_layers(Some(&user)).with_context(|| format!("in {}", path.display()))
    }

    /// Parse the embedded defaults and merge `user` over them table by table.
    pub fn from_layers(user: Option<&str>) -> Result<Self> {
        let mut merged: toml::Value = toml::from_str(DEFAULTS)?;
        if let Some(user) = user {
            let user: toml::Value = toml::from_str(user)?;
            merge(&mut merged, user);
        }

        let mut config: AppConfig = merged.try_into()?;

        let root = config.broker.config_root.trim();
        if root.is_empty() {
            let data = directories::ProjectDirs::from("", "", "switchboard")
                .map(|dirs| dirs.data_dir().join("configs"))
                .ok_or_else(|| anyhow!("cannot determine data directory"))?;
            config.broker.config_root = data.to_string_lossy().into_owned();
        } else if root.starts_with('~') {
            let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
            config.broker.config_root = root.replacen('~', &home.to_string_lossy(), 1);
        }

        Ok(config)
    }

    pub fn config_root(&self) -> PathBuf {
        PathBuf::from(&self.broker.config_root)
    }

    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginConfig> {
        self.plugins.iter().filter(|plugin| plugin.enabled)
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
