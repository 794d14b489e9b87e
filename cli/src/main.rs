// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # devstack CLI
//!
//! Manages local development instances: each one a project recipe plus the
//! containers, volumes and networks derived from its name prefix.
//!
//! ## Commands
//!
//! - `devstack list|register|deregister|use` - Registry
//! - `devstack start|stop|destroy` - Instance lifecycle
//! - `devstack proxy enable|disable|reload|status|assign` - Shared reverse proxy
//! - `devstack config show|paths` - Settings and file locations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use devstack_cli::commands::{self, AppContext, ConfigCommand, InstanceCommand, ProxyCommand};

/// devstack - Local development environments on a container engine
#[derive(Parser)]
#[command(name = "devstack")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Base directory for the registry and generated files
    #[arg(long, global = true, env = "DEVSTACK_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Settings file (default: settings.yaml in the base directory)
    #[arg(long, global = true, env = "DEVSTACK_SETTINGS", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DEVSTACK_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Instance(InstanceCommand),

    /// Shared reverse proxy
    #[command(name = "proxy")]
    Proxy {
        #[command(subcommand)]
        command: ProxyCommand,
    },

    /// Settings and file locations
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    let ctx = AppContext::build(cli.home.clone(), cli.settings)?;

    let result = match command {
        Commands::Instance(command) => commands::instance::handle_command(command, &ctx).await,
        Commands::Proxy { command } => commands::proxy::handle_command(command, &ctx).await,
        Commands::Config { command } => {
            commands::config::handle_command(command, &ctx, cli.home.as_deref())
        }
    };

    if let Err(error) = &result {
        if let Some(hint) = commands::remediation(error) {
            eprintln!("{} {:#}", "✗".red(), error);
            eprintln!("  {}", hint.yellow());
            std::process::exit(1);
        }
    }
    result
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
