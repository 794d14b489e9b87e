// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the devstack CLI

pub mod config;
pub mod instance;
pub mod proxy;

pub use self::config::ConfigCommand;
pub use self::instance::InstanceCommand;
pub use self::proxy::ProxyCommand;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use devstack_core::application::{LifecycleService, StepOutcome, StepResult};
use devstack_core::domain::settings::{Paths, Settings};
use devstack_core::infrastructure::{DockerCliEngine, InstanceRegistry, YamlRecipeLoader};

/// Everything a command needs, wired from `--home` and `--settings`
pub struct AppContext {
    pub paths: Paths,
    pub settings: Settings,
    pub service: LifecycleService,
}

impl AppContext {
    pub fn build(home: Option<PathBuf>, settings_path: Option<PathBuf>) -> Result<Self> {
        let paths = Paths::discover(home)?;
        let settings = Settings::load_or_default(settings_path, &paths)
            .context("Failed to load settings")?;
        settings.validate().context("Invalid settings")?;
        tracing::debug!("Base directory {:?}, engine '{}'", paths.base(), settings.engine_binary);

        let registry = Arc::new(
            InstanceRegistry::open(&paths).context("Failed to open instance registry")?,
        );
        let engine = Arc::new(DockerCliEngine::new(settings.engine_binary.clone()));
        let recipes = Arc::new(YamlRecipeLoader::new(settings.recipe_file_name.clone()));
        let service = LifecycleService::new(
            registry,
            engine,
            recipes,
            paths.clone(),
            settings.clone(),
        );

        Ok(Self {
            paths,
            settings,
            service,
        })
    }
}

/// One line per step: `✓ step`, `- step (reason)` or `✗ step: error`
pub(crate) fn print_step(step: &StepResult) {
    match &step.outcome {
        StepOutcome::Done => println!("  {} {}", "✓".green(), step.step),
        StepOutcome::Skipped(reason) => {
            println!("  {} {} {}", "-".dimmed(), step.step, format!("({})", reason).dimmed())
        }
        StepOutcome::Failed(error) => println!("  {} {}: {}", "✗".red(), step.step, error.red()),
    }
}

/// Next step to suggest for errors the user can fix themselves
pub fn remediation(error: &anyhow::Error) -> Option<&'static str> {
    use devstack_core::application::LifecycleError;
    use devstack_core::infrastructure::RegistryError;

    match error.downcast_ref::<LifecycleError>()? {
        LifecycleError::MissingContainers { .. } => Some(
            "Create the instance's containers from its project first, then run `devstack start` again.",
        ),
        LifecycleError::NoRecipeInDirectory { .. } => {
            Some("Run from the project directory or pass the instance prefix explicitly.")
        }
        LifecycleError::Registry(RegistryError::Conflict { .. }) => {
            Some("Re-run with --dedupe to replace the conflicting registrations.")
        }
        LifecycleError::NoFreeProxyPort { .. } => {
            Some("Widen proxy.port_range_start/port_range_end in settings.yaml.")
        }
        _ => None,
    }
}
