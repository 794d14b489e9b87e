// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tool Settings
//
// Defines where devstack keeps its state and how it talks to the outside:
// - Per-user base directory (registry, global config, generated files)
// - Container engine binary
// - Shared proxy container definition and proxy port range

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "DEVSTACK_HOME";
const SETTINGS_FILE: &str = "settings.yaml";

/// Filesystem layout under the per-user base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve the base directory
    /// 1. Explicit path (CLI flag)
    /// 2. DEVSTACK_HOME environment variable
    /// 3. <user config dir>/devstack
    pub fn discover(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Ok(path) = std::env::var(HOME_ENV) {
            if !path.is_empty() {
                return Ok(Self::new(path));
            }
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine user config directory; set {}", HOME_ENV))?;
        Ok(Self::new(config_dir.join("devstack")))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn registry_file(&self) -> PathBuf {
        self.base.join("instances")
    }

    pub fn global_file(&self) -> PathBuf {
        self.base.join("global.yaml")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base.join(SETTINGS_FILE)
    }

    pub fn proxy_config_file(&self) -> PathBuf {
        self.base.join("proxy").join("routes.conf")
    }

    /// Generated files belonging to one instance
    pub fn instance_dir(&self, name_prefix: &str) -> PathBuf {
        self.base.join("instances.d").join(name_prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Container engine CLI (docker-compatible)
    #[serde(default = "default_engine_binary")]
    pub engine_binary: String,

    /// File name looked up when resolving the recipe of the working directory
    #[serde(default = "default_recipe_file_name")]
    pub recipe_file_name: String,

    #[serde(default)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_proxy_container")]
    pub container_name: String,

    #[serde(default = "default_proxy_image")]
    pub image: String,

    /// Host port the shared proxy publishes
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Address of the host as seen from inside the proxy container
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,

    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_binary: default_engine_binary(),
            recipe_file_name: default_recipe_file_name(),
            proxy: ProxySettings::default(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            container_name: default_proxy_container(),
            image: default_proxy_image(),
            listen_port: default_listen_port(),
            upstream_host: default_upstream_host(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
        }
    }
}

impl Settings {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Load settings with fallback to defaults
    pub fn load_or_default(explicit: Option<PathBuf>, paths: &Paths) -> anyhow::Result<Self> {
        // 1. Explicit path (fail if missing/invalid)
        if let Some(path) = explicit {
            tracing::info!("Loading settings from explicit path: {:?}", path);
            let mut settings = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load settings at {:?}: {}", path, e))?;
            settings.apply_env_overrides();
            return Ok(settings);
        }

        // 2. Base directory
        let path = paths.settings_file();
        let mut settings = if path.exists() {
            tracing::debug!("Loading settings from {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load settings at {:?}: {}", path, e))?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DEVSTACK_ENGINE") {
            if !val.is_empty() {
                tracing::info!("Environment override: DEVSTACK_ENGINE={}", val);
                self.engine_binary = val;
            }
        }
        if let Ok(val) = std::env::var("DEVSTACK_PROXY_IMAGE") {
            if !val.is_empty() {
                tracing::info!("Environment override: DEVSTACK_PROXY_IMAGE={}", val);
                self.proxy.image = val;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine_binary.trim().is_empty() {
            anyhow::bail!("engine_binary cannot be empty");
        }
        if self.recipe_file_name.trim().is_empty() {
            anyhow::bail!("recipe_file_name cannot be empty");
        }
        if self.proxy.container_name.trim().is_empty() {
            anyhow::bail!("proxy.container_name cannot be empty");
        }
        if self.proxy.image.trim().is_empty() {
            anyhow::bail!("proxy.image cannot be empty");
        }
        if self.proxy.port_range_start > self.proxy.port_range_end {
            anyhow::bail!(
                "proxy port range is inverted: {} > {}",
                self.proxy.port_range_start,
                self.proxy.port_range_end
            );
        }
        Ok(())
    }
}

fn default_engine_binary() -> String {
    "docker".to_string()
}

fn default_recipe_file_name() -> String {
    "devstack.yml".to_string()
}

fn default_proxy_container() -> String {
    "devstack-proxy".to_string()
}

fn default_proxy_image() -> String {
    "nginx:alpine".to_string()
}

fn default_listen_port() -> u16 {
    80
}

fn default_upstream_host() -> String {
    "host.docker.internal".to_string()
}

fn default_port_range_start() -> u16 {
    8100
}

fn default_port_range_end() -> u16 {
    8199
}
