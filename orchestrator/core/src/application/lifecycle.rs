// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Application Service
//!
//! Use-case layer behind every command: list, register, start, stop,
//! destroy. It composes:
//! - `InstanceRegistry` for identity and lookup
//! - `ContainerEngine` for live state and mutation
//! - `ProxyReconciler` for routing consistency
//!
//! Coordination is strictly top-down; nothing below calls back here.
//! Read, list and destroy paths are best effort and report per item.
//! Registration and the start precondition fail fast.

use crate::application::proxy_reconciler::{ProxyAction, ProxyError, ProxyReconciler};
use crate::domain::engine::{ContainerEngine, EngineError, NetworkRecord, VolumeRecord};
use crate::domain::instance::{GlobalField, Instance, InstanceId, InstanceNames};
use crate::domain::recipe::{RecipeError, RecipeSource};
use crate::domain::settings::{Paths, Settings};
use crate::infrastructure::registry::{ConflictResolution, InstanceRegistry, Registration, RegistryError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Unknown instance '{name_prefix}'. {remediation}")]
    UnknownInstance {
        name_prefix: String,
        remediation: String,
    },

    #[error("Instance '{name_prefix}' is missing containers: {}", .names.join(", "))]
    MissingContainers {
        name_prefix: String,
        names: Vec<String>,
    },

    #[error("No recipe found in {}: {source}", .dir.display())]
    NoRecipeInDirectory {
        dir: PathBuf,
        #[source]
        source: RecipeError,
    },

    #[error("Confirmation phrase did not match; type exactly '{expected}'")]
    ConfirmationMismatch { expected: String },

    #[error("No free proxy port between {start} and {end}")]
    NoFreeProxyPort { start: u16, end: u16 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl LifecycleError {
    fn unknown(name_prefix: &str) -> Self {
        Self::UnknownInstance {
            name_prefix: name_prefix.to_string(),
            remediation: "Re-run `devstack register <recipe>` from the project directory to (re)create it, \
                          or `devstack list` to see registered instances."
                .to_string(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum StepOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// One named step of a multi-step operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: String,
    pub outcome: StepOutcome,
}

impl StepResult {
    fn new(step: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            step: step.into(),
            outcome,
        }
    }

    fn from_result<E: std::fmt::Display>(step: impl Into<String>, result: Result<(), E>) -> Self {
        let step = step.into();
        let outcome = match result {
            Ok(()) => StepOutcome::Done,
            Err(e) => {
                warn!("{} failed: {}", step, e);
                StepOutcome::Failed(e.to_string())
            }
        };
        Self { step, outcome }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub instance: Instance,
    pub running: bool,
    pub recipe_available: bool,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct StartReport {
    pub instance: Instance,
    pub containers: Vec<StepResult>,
    pub proxy: StepResult,
}

/// What `stop` resolves against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTarget {
    Instance(String),
    /// Use the recipe found in this directory
    WorkingDirectory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StopReport {
    pub name_prefix: String,
    pub containers: Vec<StepResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedContainer {
    pub name: String,
    pub exists: bool,
}

/// Everything `destroy` would remove
#[derive(Debug, Clone)]
pub struct DestroyPlan {
    pub instance: Instance,
    pub containers: Vec<PlannedContainer>,
    pub volumes: Vec<VolumeRecord>,
    pub networks: Vec<NetworkRecord>,
    pub generated_dir: Option<PathBuf>,
    /// Discovery problems; the plan is still usable
    pub warnings: Vec<String>,
}

impl DestroyPlan {
    /// Exact phrase the user must type to execute the plan
    pub fn confirmation_phrase(&self) -> String {
        confirmation_phrase(&self.instance.name_prefix)
    }
}

pub fn confirmation_phrase(name_prefix: &str) -> String {
    format!("destroy {}", name_prefix)
}

#[derive(Debug, Clone)]
pub struct DestroyReport {
    pub plan: DestroyPlan,
    pub dry_run: bool,
    pub steps: Vec<StepResult>,
}

impl DestroyReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct LifecycleService {
    registry: Arc<InstanceRegistry>,
    engine: Arc<dyn ContainerEngine>,
    recipes: Arc<dyn RecipeSource>,
    proxy: ProxyReconciler,
    paths: Paths,
    settings: Settings,
}

impl LifecycleService {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        engine: Arc<dyn ContainerEngine>,
        recipes: Arc<dyn RecipeSource>,
        paths: Paths,
        settings: Settings,
    ) -> Self {
        let proxy = ProxyReconciler::new(
            registry.clone(),
            engine.clone(),
            recipes.clone(),
            &paths,
            settings.proxy.clone(),
        );
        Self {
            registry,
            engine,
            recipes,
            proxy,
            paths,
            settings,
        }
    }

    pub fn proxy(&self) -> &ProxyReconciler {
        &self.proxy
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn resolve(&self, name_prefix: &str) -> Result<Instance, LifecycleError> {
        self.registry
            .get_by_prefix(name_prefix)?
            .ok_or_else(|| LifecycleError::unknown(name_prefix))
    }

    /// Container names derived from the instance's recipe services, or the
    /// default set when the recipe cannot be loaded
    fn expected_containers(&self, instance: &Instance) -> Vec<String> {
        match self.recipes.load(&instance.recipe_location) {
            Ok(recipe) => recipe.expected_containers(),
            Err(e) => {
                warn!(
                    "Recipe for '{}' unavailable, using default services: {}",
                    instance.name_prefix, e
                );
                instance.names().expected_containers()
            }
        }
    }

    /// Every registered instance with its running state. A failed engine
    /// query or a missing recipe never aborts the listing.
    pub async fn list_instances(&self) -> Result<Vec<InstanceStatus>, LifecycleError> {
        let active = self.registry.get_global()?.active_instance;
        let mut statuses = Vec::new();

        for instance in self.registry.list()? {
            let (primary, recipe_available) = match self.recipes.load(&instance.recipe_location) {
                Ok(recipe) => (recipe.primary_container_name(), true),
                Err(e) => {
                    warn!("Recipe for '{}' unavailable: {}", instance.name_prefix, e);
                    (instance.names().primary_container(), false)
                }
            };
            let running = match self.engine.is_running(&primary).await {
                Ok(running) => running,
                Err(e) => {
                    warn!("Cannot query {}: {}", primary, e);
                    false
                }
            };
            statuses.push(InstanceStatus {
                active: active.as_ref() == Some(&instance.id),
                instance,
                running,
                recipe_available,
            });
        }
        Ok(statuses)
    }

    /// Register the recipe at `recipe_path` under its own name prefix
    pub fn register(
        &self,
        recipe_path: &Path,
        id: Option<InstanceId>,
        resolution: ConflictResolution,
    ) -> Result<Instance, LifecycleError> {
        let recipe_location = recipe_path
            .canonicalize()
            .map_err(|_| RecipeError::NotFound(recipe_path.to_path_buf()))?;
        let recipe = self.recipes.load(&recipe_location)?;

        let id = self.registry.register(
            Registration {
                recipe_location,
                id,
                name_prefix: recipe.name_prefix.clone(),
            },
            resolution,
        )?;
        self.registry
            .get_by_id(&id)?
            .ok_or_else(|| LifecycleError::unknown(&recipe.name_prefix))
    }

    /// Remove the registry entry only; engine objects are left alone
    pub fn deregister(&self, name_prefix: &str) -> Result<bool, LifecycleError> {
        Ok(self.registry.deregister(name_prefix)?)
    }

    pub fn activate(&self, name_prefix: &str) -> Result<Instance, LifecycleError> {
        let instance = self.resolve(name_prefix)?;
        self.registry
            .set_global_field(GlobalField::ActiveInstance(Some(instance.id.clone())))?;
        Ok(instance)
    }

    /// Start every expected container of the instance. Refuses to start a
    /// partially provisioned instance.
    pub async fn start(&self, name_prefix: &str) -> Result<StartReport, LifecycleError> {
        let instance = self.resolve(name_prefix)?;
        let expected = self.expected_containers(&instance);

        let mut missing = Vec::new();
        for name in &expected {
            if !self.engine.container_exists(name).await? {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(LifecycleError::MissingContainers {
                name_prefix: instance.name_prefix.clone(),
                names: missing,
            });
        }

        let mut containers = Vec::new();
        for name in &expected {
            let result = self.engine.start(name).await;
            if result.is_ok() {
                info!("Started {}", name);
            }
            containers.push(StepResult::from_result(format!("start {}", name), result));
        }

        let proxy = match self.proxy.ensure_running().await {
            Ok(ProxyAction::Disabled) => StepResult::new("proxy", StepOutcome::Skipped("proxy mode disabled".to_string())),
            Ok(ProxyAction::AlreadyRunning) => StepResult::new("proxy", StepOutcome::Skipped("already running".to_string())),
            Ok(_) => StepResult::new("proxy", StepOutcome::Done),
            Err(e) => StepResult::from_result::<ProxyError>("proxy", Err(e)),
        };

        Ok(StartReport {
            instance,
            containers,
            proxy,
        })
    }

    /// Stop the instance's running containers, including auxiliary
    /// `{prefix}-behat*` containers
    pub async fn stop(&self, target: StopTarget) -> Result<StopReport, LifecycleError> {
        let (name_prefix, expected) = match target {
            StopTarget::Instance(prefix) => {
                let instance = self.resolve(&prefix)?;
                let expected = self.expected_containers(&instance);
                (instance.name_prefix, expected)
            }
            StopTarget::WorkingDirectory(dir) => {
                let (_, recipe) = self
                    .recipes
                    .discover(&dir)
                    .map_err(|source| LifecycleError::NoRecipeInDirectory { dir, source })?;
                let expected = recipe.expected_containers();
                (recipe.name_prefix, expected)
            }
        };

        let names = InstanceNames::new(&name_prefix);
        let running = self.engine.list_containers(false).await?;
        let mut containers = Vec::new();
        for name in running
            .iter()
            .filter_map(|c| c.names().find(|n| names.matches_stoppable(n, &expected)))
        {
            let result = self.engine.stop(name).await;
            if result.is_ok() {
                info!("Stopped {}", name);
            }
            containers.push(StepResult::from_result(format!("stop {}", name), result));
        }

        Ok(StopReport {
            name_prefix,
            containers,
        })
    }

    /// Work out everything `destroy` would touch, without mutating
    pub async fn plan_destroy(&self, name_prefix: &str) -> Result<DestroyPlan, LifecycleError> {
        let instance = self.resolve(name_prefix)?;
        let names = instance.names();
        let registered: Vec<String> = self.registry.list()?.into_iter().map(|i| i.name_prefix).collect();
        let mut warnings = Vec::new();

        let existing: Option<Vec<String>> = match self.engine.list_containers(true).await {
            Ok(containers) => Some(
                containers
                    .iter()
                    .flat_map(|c| c.names().map(str::to_string))
                    .collect(),
            ),
            Err(e) => {
                warnings.push(format!("could not list containers: {}", e));
                None
            }
        };
        let containers = self
            .expected_containers(&instance)
            .into_iter()
            .map(|name| PlannedContainer {
                exists: existing.as_ref().is_none_or(|names| names.contains(&name)),
                name,
            })
            .collect();

        let volumes = match self.engine.list_volumes().await {
            Ok(volumes) => volumes
                .into_iter()
                .filter(|v| names.owns_resource_among(&v.name, &registered))
                .collect(),
            Err(e) => {
                warnings.push(format!("could not list volumes: {}", e));
                Vec::new()
            }
        };

        let networks = match self.engine.list_networks().await {
            Ok(networks) => networks
                .into_iter()
                .filter(|n| names.owns_resource_among(&n.name, &registered))
                .collect(),
            Err(e) => {
                warnings.push(format!("could not list networks: {}", e));
                Vec::new()
            }
        };

        let dir = self.paths.instance_dir(&instance.name_prefix);
        let generated_dir = dir.exists().then_some(dir);

        Ok(DestroyPlan {
            instance,
            containers,
            volumes,
            networks,
            generated_dir,
            warnings,
        })
    }

    /// Tear the instance down completely.
    ///
    /// The plan is always computed first. A dry run returns it untouched;
    /// otherwise it is handed to [`execute_destroy`](Self::execute_destroy).
    pub async fn destroy(
        &self,
        name_prefix: &str,
        dry_run: bool,
        confirmation: Option<&str>,
    ) -> Result<DestroyReport, LifecycleError> {
        let plan = self.plan_destroy(name_prefix).await?;
        if dry_run {
            return Ok(DestroyReport {
                plan,
                dry_run: true,
                steps: Vec::new(),
            });
        }
        self.execute_destroy(plan, confirmation).await
    }

    /// Execute exactly the resources listed in `plan`; nothing discovered
    /// after it was computed is touched.
    ///
    /// `confirmation` must equal the plan's phrase before anything is
    /// mutated. Steps run in order (generated files, containers, volumes,
    /// networks, registry entry) and a failing step never stops later ones.
    pub async fn execute_destroy(
        &self,
        plan: DestroyPlan,
        confirmation: Option<&str>,
    ) -> Result<DestroyReport, LifecycleError> {
        let expected = plan.confirmation_phrase();
        if confirmation.map(str::trim) != Some(expected.as_str()) {
            return Err(LifecycleError::ConfirmationMismatch { expected });
        }

        let mut steps = Vec::new();
        let prefix = plan.instance.name_prefix.clone();

        let generated_dir = self.paths.instance_dir(&prefix);
        steps.push(if plan.generated_dir.is_some() {
            StepResult::from_result(
                format!("remove files {}", generated_dir.display()),
                std::fs::remove_dir_all(&generated_dir),
            )
        } else {
            StepResult::new(
                format!("remove files {}", generated_dir.display()),
                StepOutcome::Skipped("nothing generated".to_string()),
            )
        });

        for container in &plan.containers {
            steps.push(self.destroy_container(&container.name).await);
        }

        for volume in &plan.volumes {
            let step = format!("remove volume {}", volume.name);
            steps.push(match self.engine.remove_volume(&volume.name).await {
                Ok(true) => StepResult::new(step, StepOutcome::Done),
                Ok(false) => StepResult::new(step, StepOutcome::Skipped("already gone or still in use".to_string())),
                Err(e) => StepResult::from_result::<EngineError>(step, Err(e)),
            });
        }

        for network in &plan.networks {
            let step = format!("remove network {}", network.name);
            steps.push(match self.engine.remove_network(&network.name).await {
                Ok(true) => StepResult::new(step, StepOutcome::Done),
                Ok(false) => StepResult::new(step, StepOutcome::Skipped("already gone or still in use".to_string())),
                Err(e) => StepResult::from_result::<EngineError>(step, Err(e)),
            });
        }

        let step = format!("deregister {}", prefix);
        steps.push(match self.registry.deregister(&prefix) {
            Ok(true) => StepResult::new(step, StepOutcome::Done),
            Ok(false) => StepResult::new(step, StepOutcome::Skipped("not registered".to_string())),
            Err(e) => StepResult::from_result::<RegistryError>(step, Err(e)),
        });

        if plan.instance.proxy_port.is_some() {
            steps.push(match self.proxy.is_enabled() {
                Ok(true) => StepResult::from_result(
                    "reload proxy",
                    self.proxy.apply_and_restart().await.map(drop),
                ),
                Ok(false) => StepResult::new("reload proxy", StepOutcome::Skipped("proxy mode disabled".to_string())),
                Err(e) => StepResult::from_result::<ProxyError>("reload proxy", Err(e)),
            });
        }

        info!("Destroyed instance '{}'", prefix);
        Ok(DestroyReport {
            plan,
            dry_run: false,
            steps,
        })
    }

    async fn destroy_container(&self, name: &str) -> StepResult {
        let step = format!("remove container {}", name);
        match self.engine.container_exists(name).await {
            Ok(false) => return StepResult::new(step, StepOutcome::Skipped("not found".to_string())),
            Ok(true) => {}
            Err(e) => return StepResult::from_result::<EngineError>(step, Err(e)),
        }
        if let Err(e) = self.engine.stop(name).await {
            warn!("Stopping {} failed, removing anyway: {}", name, e);
        }
        StepResult::from_result(step, self.engine.remove(name).await)
    }

    /// Give the instance a proxy port from the configured range, skipping
    /// ports held by other registry entries or published by any container
    pub async fn assign_proxy_port(&self, name_prefix: &str) -> Result<u16, LifecycleError> {
        let instance = self.resolve(name_prefix)?;
        if let Some(port) = instance.proxy_port {
            return Ok(port);
        }

        let taken: Vec<u16> = self.registry.list()?.iter().filter_map(|i| i.proxy_port).collect();
        let (start, end) = (self.settings.proxy.port_range_start, self.settings.proxy.port_range_end);
        let mut chosen = None;
        for port in start..=end {
            if taken.contains(&port) {
                continue;
            }
            if !self.engine.port_is_bound(port).await? {
                chosen = Some(port);
                break;
            }
        }
        let port = chosen.ok_or(LifecycleError::NoFreeProxyPort { start, end })?;

        self.registry.set_proxy_port(name_prefix, Some(port))?;
        info!("Assigned proxy port {} to '{}'", port, name_prefix);
        if self.proxy.is_enabled()? {
            self.proxy.apply_and_restart().await?;
        }
        Ok(port)
    }
}
