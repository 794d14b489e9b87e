// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared proxy commands
//!
//! Commands: enable, disable, reload, status, assign

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use devstack_core::application::proxy_reconciler::{ProxyConfigReport, SkippedRoute};
use devstack_core::application::{ProxyAction, ProxyContainerState};
use devstack_core::infrastructure::proxy_routes::ProxyRoute;

use super::AppContext;

#[derive(Subcommand)]
pub enum ProxyCommand {
    /// Turn proxy mode on and (re)start the shared proxy
    Enable,

    /// Turn proxy mode off and stop the shared proxy
    Disable,

    /// Regenerate the routing file and restart the proxy
    Reload,

    /// Show proxy mode, the proxy container and its routes
    Status,

    /// Give an instance a proxy port from the configured range
    Assign {
        #[arg(value_name = "PREFIX")]
        prefix: String,
    },
}

pub async fn handle_command(command: ProxyCommand, ctx: &AppContext) -> Result<()> {
    let proxy = ctx.service.proxy();
    match command {
        ProxyCommand::Enable => {
            let (report, action) = proxy.enable().await?;
            print_config(&report);
            println!("{}", format!("✓ Proxy mode enabled ({})", describe(action)).green());
        }
        ProxyCommand::Disable => {
            let action = proxy.disable().await?;
            println!("{}", format!("✓ Proxy mode disabled ({})", describe(action)).green());
        }
        ProxyCommand::Reload => {
            let (report, action) = proxy.apply_and_restart().await?;
            print_config(&report);
            println!("{}", format!("✓ Proxy reloaded ({})", describe(action)).green());
        }
        ProxyCommand::Status => {
            let status = proxy.status().await?;
            let mode = if status.enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            println!("Proxy mode: {}", mode);
            println!(
                "Container:  {} ({})",
                ctx.settings.proxy.container_name,
                match status.container {
                    ProxyContainerState::Running => "running".green(),
                    ProxyContainerState::Stopped => "stopped".yellow(),
                    ProxyContainerState::Absent => "absent".dimmed(),
                }
            );
            println!("Config:     {}", proxy.config_file().display());
            print_routes(&status.routes, &status.skipped);
        }
        ProxyCommand::Assign { prefix } => {
            let port = ctx.service.assign_proxy_port(&prefix).await?;
            println!("{}", format!("✓ '{}' uses proxy port {}", prefix, port).green());
        }
    }
    Ok(())
}

fn describe(action: ProxyAction) -> &'static str {
    match action {
        ProxyAction::Disabled => "proxy not running",
        ProxyAction::AlreadyRunning => "already running",
        ProxyAction::Started => "started",
        ProxyAction::Created => "created",
        ProxyAction::Restarted => "restarted",
        ProxyAction::Stopped => "stopped",
    }
}

fn print_config(report: &ProxyConfigReport) {
    println!("Wrote {}", report.path.display());
    print_routes(&report.routes, &report.skipped);
}

fn print_routes(routes: &[ProxyRoute], skipped: &[SkippedRoute]) {
    if routes.is_empty() {
        println!("  {}", "(no routes)".dimmed());
    }
    for route in routes {
        println!(
            "  {} -> {}:{} {}",
            route.hostname.bold(),
            route.upstream_host,
            route.upstream_port,
            format!("[{}]", route.name_prefix).dimmed()
        );
    }
    for skip in skipped {
        println!("  {}", format!("⚠ {} skipped: {}", skip.name_prefix, skip.reason).yellow());
    }
}
