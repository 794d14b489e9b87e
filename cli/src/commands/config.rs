// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration commands
//!
//! Commands: show, paths

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use devstack_core::domain::settings::HOME_ENV;

use super::AppContext;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective settings and global state
    Show,

    /// Show where devstack keeps its files
    Paths,
}

pub fn handle_command(command: ConfigCommand, ctx: &AppContext, home_override: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Paths => paths(ctx, home_override),
    }
}

fn show(ctx: &AppContext) -> Result<()> {
    println!("{}", "Settings:".bold());
    let yaml = serde_yaml::to_string(&ctx.settings).context("Failed to render settings")?;
    for line in yaml.lines() {
        println!("  {}", line);
    }
    println!();

    let global = ctx.service.registry().get_global()?;
    println!("{}", "Global state:".bold());
    println!("  Proxy mode: {}", if global.proxy_mode_enabled { "enabled" } else { "disabled" });
    match ctx.service.registry().get_active()? {
        Some(active) => println!("  Active instance: {} ({})", active.name_prefix, active.id),
        None => println!("  Active instance: {}", "(none)".dimmed()),
    }
    Ok(())
}

fn paths(ctx: &AppContext, home_override: Option<&Path>) -> Result<()> {
    println!("{}", "Base directory discovery:".bold());
    println!("  1. --home flag: {}", describe(home_override.map(Path::to_path_buf)));
    println!(
        "  2. {}: {}",
        HOME_ENV,
        describe(std::env::var(HOME_ENV).ok().filter(|v| !v.is_empty()).map(PathBuf::from))
    );
    println!("  3. <user config dir>/devstack");
    println!();

    let p = &ctx.paths;
    println!("{}", "Files:".bold());
    for (label, path) in [
        ("Base", p.base().to_path_buf()),
        ("Registry", p.registry_file()),
        ("Global", p.global_file()),
        ("Settings", p.settings_file()),
        ("Proxy config", p.proxy_config_file()),
        ("Generated", p.base().join("instances.d")),
    ] {
        let exists = if path.exists() { "".normal() } else { "(missing)".dimmed() };
        println!("  {:<13} {} {}", format!("{}:", label), path.display(), exists);
    }
    Ok(())
}

fn describe(path: Option<PathBuf>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}
