// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Instance commands
//!
//! Commands: list, register, deregister, use, start, stop, destroy

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Confirm, Input};
use std::path::{Path, PathBuf};

use devstack_core::application::lifecycle::{DestroyPlan, InstanceStatus};
use devstack_core::application::{LifecycleError, StopTarget};
use devstack_core::domain::instance::{Instance, InstanceId};
use devstack_core::infrastructure::{ConflictResolution, RegistryError};

use super::{print_step, AppContext};

#[derive(Subcommand)]
pub enum InstanceCommand {
    /// List registered instances and whether they are running
    List {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a project recipe as an instance
    Register {
        /// Recipe file or project directory (default: current directory)
        #[arg(value_name = "RECIPE")]
        recipe: Option<PathBuf>,

        /// Keep this instance id instead of generating one
        #[arg(long, value_name = "ID")]
        id: Option<String>,

        /// Remove conflicting registrations without asking
        #[arg(long)]
        dedupe: bool,
    },

    /// Remove an instance from the registry, leaving its containers alone
    Deregister {
        #[arg(value_name = "PREFIX")]
        prefix: String,
    },

    /// Mark an instance as the active one
    Use {
        #[arg(value_name = "PREFIX")]
        prefix: String,
    },

    /// Start an instance's containers
    Start {
        #[arg(value_name = "PREFIX")]
        prefix: String,
    },

    /// Stop an instance's running containers
    Stop {
        /// Instance prefix (default: recipe in the current directory)
        #[arg(value_name = "PREFIX")]
        prefix: Option<String>,
    },

    /// Remove an instance's containers, volumes, networks and registration
    Destroy {
        #[arg(value_name = "PREFIX")]
        prefix: String,

        /// Show what would be removed and exit
        #[arg(long)]
        dry_run: bool,

        /// Confirmation phrase, skips the prompt
        #[arg(long, value_name = "PHRASE")]
        confirm: Option<String>,
    },
}

pub async fn handle_command(command: InstanceCommand, ctx: &AppContext) -> Result<()> {
    match command {
        InstanceCommand::List { json } => list(ctx, json).await,
        InstanceCommand::Register { recipe, id, dedupe } => register(ctx, recipe, id, dedupe),
        InstanceCommand::Deregister { prefix } => deregister(ctx, &prefix),
        InstanceCommand::Use { prefix } => use_instance(ctx, &prefix),
        InstanceCommand::Start { prefix } => start(ctx, &prefix).await,
        InstanceCommand::Stop { prefix } => stop(ctx, prefix).await,
        InstanceCommand::Destroy {
            prefix,
            dry_run,
            confirm,
        } => destroy(ctx, &prefix, dry_run, confirm).await,
    }
}

async fn list(ctx: &AppContext, json: bool) -> Result<()> {
    let statuses = ctx.service.list_instances().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("{}", "No instances registered".yellow());
        println!("Run 'devstack register' in a project directory to add one.");
        return Ok(());
    }

    println!("  {:<24} {:<10} {:<8} {}", "PREFIX", "STATUS", "PROXY", "RECIPE");
    for status in &statuses {
        println!("{}", format_status(status));
    }
    Ok(())
}

fn format_status(status: &InstanceStatus) -> String {
    let marker = if status.active { "*" } else { " " };
    let state = if status.running {
        format!("{:<10}", "running").green()
    } else {
        format!("{:<10}", "stopped").dimmed()
    };
    let port = status
        .instance
        .proxy_port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let recipe = status.instance.recipe_location.display().to_string();
    let recipe = if status.recipe_available {
        recipe.normal()
    } else {
        format!("{} (missing)", recipe).red()
    };
    format!(
        "{} {:<24} {} {:<8} {}",
        marker,
        status.instance.name_prefix.bold(),
        state,
        port,
        recipe
    )
}

/// A directory means "the recipe file inside it"
fn recipe_path(recipe: Option<PathBuf>, file_name: &str) -> Result<PathBuf> {
    let path = match recipe {
        Some(path) => path,
        None => std::env::current_dir().context("Cannot read current directory")?,
    };
    Ok(if path.is_dir() { path.join(file_name) } else { path })
}

fn register(ctx: &AppContext, recipe: Option<PathBuf>, id: Option<String>, dedupe: bool) -> Result<()> {
    let path = recipe_path(recipe, &ctx.settings.recipe_file_name)?;
    let id = id.map(InstanceId::new);
    let resolution = if dedupe {
        ConflictResolution::Deduplicate
    } else {
        ConflictResolution::Abort
    };

    let instance = match ctx.service.register(&path, id.clone(), resolution) {
        Ok(instance) => instance,
        Err(LifecycleError::Registry(RegistryError::Conflict { conflicts, .. })) => {
            println!("{}", "⚠ Conflicting registrations:".yellow());
            for conflict in &conflicts {
                println!(
                    "  {} {} ({})",
                    conflict.id,
                    conflict.name_prefix.bold(),
                    conflict.recipe_location.display()
                );
            }
            let remove = Confirm::new()
                .with_prompt("Remove them and register this recipe?")
                .default(false)
                .interact()?;
            if !remove {
                println!("{}", "Cancelled.".yellow());
                return Ok(());
            }
            ctx.service
                .register(&path, id, ConflictResolution::Deduplicate)?
        }
        Err(e) => return Err(e.into()),
    };

    print_registered(&instance);
    Ok(())
}

fn print_registered(instance: &Instance) {
    println!(
        "{}",
        format!("✓ Registered '{}' ({})", instance.name_prefix, instance.id).green()
    );
    println!("  Recipe: {}", instance.recipe_location.display());
}

fn deregister(ctx: &AppContext, prefix: &str) -> Result<()> {
    if ctx.service.deregister(prefix)? {
        println!("{}", format!("✓ Deregistered '{}'", prefix).green());
        println!("  Containers, volumes and networks were left in place.");
    } else {
        println!("{}", format!("No instance named '{}'", prefix).yellow());
    }
    Ok(())
}

fn use_instance(ctx: &AppContext, prefix: &str) -> Result<()> {
    let instance = ctx.service.activate(prefix)?;
    println!("{}", format!("✓ Active instance: {}", instance.name_prefix).green());
    Ok(())
}

async fn start(ctx: &AppContext, prefix: &str) -> Result<()> {
    println!("Starting {}...", prefix.bold());
    let report = ctx.service.start(prefix).await?;

    for step in &report.containers {
        print_step(step);
    }
    print_step(&report.proxy);

    let failed = report.containers.iter().filter(|s| s.outcome.is_failure()).count();
    if failed > 0 {
        bail!("{} container(s) of '{}' failed to start", failed, prefix);
    }
    println!("{}", format!("✓ {} is up", report.instance.name_prefix).green().bold());
    Ok(())
}

async fn stop(ctx: &AppContext, prefix: Option<String>) -> Result<()> {
    let target = match prefix {
        Some(prefix) => StopTarget::Instance(prefix),
        None => StopTarget::WorkingDirectory(
            std::env::current_dir().context("Cannot read current directory")?,
        ),
    };
    let report = ctx.service.stop(target).await?;

    if report.containers.is_empty() {
        println!("{}", format!("Nothing running for '{}'", report.name_prefix).yellow());
        return Ok(());
    }
    for step in &report.containers {
        print_step(step);
    }
    if report.containers.iter().any(|s| s.outcome.is_failure()) {
        bail!("Some containers of '{}' did not stop", report.name_prefix);
    }
    println!("{}", format!("✓ Stopped {}", report.name_prefix).green());
    Ok(())
}

async fn destroy(ctx: &AppContext, prefix: &str, dry_run: bool, confirm: Option<String>) -> Result<()> {
    if dry_run {
        let report = ctx.service.destroy(prefix, true, None).await?;
        print_plan(&report.plan, &ctx.paths.registry_file());
        println!();
        println!("{}", "Dry run: nothing was removed.".yellow());
        return Ok(());
    }

    let plan = ctx.service.plan_destroy(prefix).await?;
    print_plan(&plan, &ctx.paths.registry_file());
    println!();

    let phrase = match confirm {
        Some(phrase) => phrase,
        None => Input::<String>::new()
            .with_prompt(format!("Type '{}' to continue", plan.confirmation_phrase()))
            .allow_empty(true)
            .interact_text()?,
    };

    let report = match ctx.service.execute_destroy(plan, Some(&phrase)).await {
        Ok(report) => report,
        Err(LifecycleError::ConfirmationMismatch { .. }) => {
            println!("{}", "Cancelled: confirmation did not match.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for step in &report.steps {
        print_step(step);
    }
    let failures = report.failures().count();
    if failures > 0 {
        bail!("{} step(s) failed while destroying '{}'", failures, prefix);
    }
    println!("{}", format!("✓ Destroyed {}", prefix).green().bold());
    Ok(())
}

fn print_plan(plan: &DestroyPlan, registry_file: &Path) {
    println!(
        "{}",
        format!("Destroying '{}' will remove:", plan.instance.name_prefix).bold()
    );

    println!("  Containers:");
    for container in &plan.containers {
        if container.exists {
            println!("    - {}", container.name);
        } else {
            println!("    - {} {}", container.name, "(not found)".dimmed());
        }
    }

    println!("  Volumes:");
    if plan.volumes.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for volume in &plan.volumes {
        println!("    - {}", volume.name);
    }

    println!("  Networks:");
    if plan.networks.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for network in &plan.networks {
        println!("    - {}", network.name);
    }

    if let Some(dir) = &plan.generated_dir {
        println!("  Files: {}", dir.display());
    }
    println!("  Registry entry in {}", registry_file.display());

    for warning in &plan.warnings {
        println!("{}", format!("⚠ {}", warning).yellow());
    }
}
