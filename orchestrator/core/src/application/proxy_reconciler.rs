// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Proxy Reconciler Application Service
//!
//! Keeps the shared reverse proxy's routing table consistent with the
//! registry. Routes are derived from every instance that has a proxy port
//! and whose recipe names a host. Regenerating the file alone never changes
//! live routing; only `apply_and_restart` does.
//!
//! Proxy container states: absent, running, stopped. There is no degraded
//! state: the proxy is either reconfigured and restarted, or left untouched.

use crate::domain::engine::{ContainerEngine, ContainerSpec, EngineError};
use crate::domain::instance::GlobalField;
use crate::domain::recipe::RecipeSource;
use crate::domain::settings::{Paths, ProxySettings};
use crate::infrastructure::proxy_routes::{
    is_valid_server_name, render_nginx_config, ProxyRoute, PROXY_CONTAINER_PORT,
};
use crate::infrastructure::registry::{InstanceRegistry, RegistryError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const NGINX_CONFIG_TARGET: &str = "/etc/nginx/conf.d/default.conf";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to write proxy config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyContainerState {
    Absent,
    Running,
    Stopped,
}

/// What a reconciliation call did to the proxy container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAction {
    /// Proxy mode is off; nothing touched
    Disabled,
    AlreadyRunning,
    Started,
    Created,
    Restarted,
    Stopped,
}

/// An instance left out of the routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRoute {
    pub name_prefix: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfigReport {
    pub path: PathBuf,
    pub routes: Vec<ProxyRoute>,
    pub skipped: Vec<SkippedRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStatus {
    pub enabled: bool,
    pub container: ProxyContainerState,
    pub routes: Vec<ProxyRoute>,
    pub skipped: Vec<SkippedRoute>,
}

pub struct ProxyReconciler {
    registry: Arc<InstanceRegistry>,
    engine: Arc<dyn ContainerEngine>,
    recipes: Arc<dyn RecipeSource>,
    config_file: PathBuf,
    settings: ProxySettings,
}

impl ProxyReconciler {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        engine: Arc<dyn ContainerEngine>,
        recipes: Arc<dyn RecipeSource>,
        paths: &Paths,
        settings: ProxySettings,
    ) -> Self {
        Self {
            registry,
            engine,
            recipes,
            config_file: paths.proxy_config_file(),
            settings,
        }
    }

    pub fn config_file(&self) -> &PathBuf {
        &self.config_file
    }

    pub fn is_enabled(&self) -> Result<bool, ProxyError> {
        Ok(self.registry.get_global()?.proxy_mode_enabled)
    }

    /// Routing table derived from the registry. One unloadable recipe only
    /// drops that instance.
    pub fn collect_routes(&self) -> Result<(Vec<ProxyRoute>, Vec<SkippedRoute>), ProxyError> {
        let mut routes = Vec::new();
        let mut skipped = Vec::new();

        for instance in self.registry.list()? {
            let Some(port) = instance.proxy_port else {
                continue;
            };
            let recipe = match self.recipes.load(&instance.recipe_location) {
                Ok(recipe) => recipe,
                Err(e) => {
                    warn!("Not proxying '{}': {}", instance.name_prefix, e);
                    skipped.push(SkippedRoute {
                        name_prefix: instance.name_prefix.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match recipe.host.as_deref().map(str::trim) {
                Some(host) if is_valid_server_name(host) => routes.push(ProxyRoute {
                    name_prefix: instance.name_prefix.clone(),
                    hostname: host.to_string(),
                    upstream_host: self.settings.upstream_host.clone(),
                    upstream_port: port,
                }),
                Some(host) if !host.is_empty() => {
                    warn!("Not proxying '{}': invalid host '{}'", instance.name_prefix, host);
                    skipped.push(SkippedRoute {
                        name_prefix: instance.name_prefix.clone(),
                        reason: format!("recipe host '{}' is not a valid server name", host),
                    })
                }
                _ => skipped.push(SkippedRoute {
                    name_prefix: instance.name_prefix.clone(),
                    reason: "recipe has no host".to_string(),
                }),
            }
        }
        Ok((routes, skipped))
    }

    /// Rewrite the routing file. A running proxy keeps its old routes until
    /// restarted.
    pub fn regenerate_config(&self) -> Result<ProxyConfigReport, ProxyError> {
        let (routes, skipped) = self.collect_routes()?;
        let content = render_nginx_config(&routes);

        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ProxyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        // Written in place: a single-file bind mount follows the inode
        std::fs::write(&self.config_file, content).map_err(|source| ProxyError::Io {
            path: self.config_file.clone(),
            source,
        })?;
        info!(
            "Wrote proxy config with {} route(s) to {:?}",
            routes.len(),
            self.config_file
        );

        Ok(ProxyConfigReport {
            path: self.config_file.clone(),
            routes,
            skipped,
        })
    }

    pub async fn container_state(&self) -> Result<ProxyContainerState, ProxyError> {
        let containers = self.engine.list_containers(true).await?;
        Ok(
            match containers.iter().find(|c| c.has_name(&self.settings.container_name)) {
                None => ProxyContainerState::Absent,
                Some(c) if c.is_up() => ProxyContainerState::Running,
                Some(_) => ProxyContainerState::Stopped,
            },
        )
    }

    /// No-op when proxy mode is off or the proxy already runs
    pub async fn ensure_running(&self) -> Result<ProxyAction, ProxyError> {
        if !self.is_enabled()? {
            return Ok(ProxyAction::Disabled);
        }
        match self.container_state().await? {
            ProxyContainerState::Running => Ok(ProxyAction::AlreadyRunning),
            ProxyContainerState::Stopped => {
                self.engine.start(&self.settings.container_name).await?;
                info!("Started proxy container {}", self.settings.container_name);
                Ok(ProxyAction::Started)
            }
            ProxyContainerState::Absent => {
                if !self.config_file.exists() {
                    self.regenerate_config()?;
                }
                self.create().await
            }
        }
    }

    /// Regenerate the routing file, then restart the proxy (or create it)
    pub async fn apply_and_restart(&self) -> Result<(ProxyConfigReport, ProxyAction), ProxyError> {
        let report = self.regenerate_config()?;
        let action = match self.container_state().await? {
            ProxyContainerState::Running | ProxyContainerState::Stopped => {
                self.engine.restart(&self.settings.container_name).await?;
                info!("Restarted proxy container {}", self.settings.container_name);
                ProxyAction::Restarted
            }
            ProxyContainerState::Absent => self.create().await?,
        };
        Ok((report, action))
    }

    pub async fn enable(&self) -> Result<(ProxyConfigReport, ProxyAction), ProxyError> {
        self.registry
            .set_global_field(GlobalField::ProxyModeEnabled(true))?;
        self.apply_and_restart().await
    }

    /// Turn proxy mode off and stop the shared proxy if it runs
    pub async fn disable(&self) -> Result<ProxyAction, ProxyError> {
        self.registry
            .set_global_field(GlobalField::ProxyModeEnabled(false))?;
        match self.container_state().await? {
            ProxyContainerState::Running => {
                self.engine.stop(&self.settings.container_name).await?;
                info!("Stopped proxy container {}", self.settings.container_name);
                Ok(ProxyAction::Stopped)
            }
            _ => Ok(ProxyAction::Disabled),
        }
    }

    pub async fn status(&self) -> Result<ProxyStatus, ProxyError> {
        let (routes, skipped) = self.collect_routes()?;
        Ok(ProxyStatus {
            enabled: self.is_enabled()?,
            container: self.container_state().await?,
            routes,
            skipped,
        })
    }

    async fn create(&self) -> Result<ProxyAction, ProxyError> {
        let spec = ContainerSpec {
            name: self.settings.container_name.clone(),
            image: self.settings.image.clone(),
            published_ports: vec![(self.settings.listen_port, PROXY_CONTAINER_PORT)],
            binds: vec![format!(
                "{}:{}:ro",
                self.config_file.display(),
                NGINX_CONFIG_TARGET
            )],
            extra_hosts: vec![format!("{}:host-gateway", self.settings.upstream_host)],
        };
        self.engine.run(&spec).await?;
        info!("Created proxy container {}", spec.name);
        Ok(ProxyAction::Created)
    }
}
