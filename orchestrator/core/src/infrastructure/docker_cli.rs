// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::engine::{
    ContainerEngine, ContainerRecord, ContainerSpec, EngineError, NetworkRecord, VolumeRecord,
};
use crate::infrastructure::table::{parse_table, TableParseError, TableRow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// `(required, optional)` header sets per list command. Optional columns
/// still bound their neighbours when the engine prints them.
const CONTAINER_HEADERS: (&[&str], &[&str]) = (
    &["NAMES", "STATUS"],
    &["CONTAINER ID", "IMAGE", "COMMAND", "CREATED", "PORTS"],
);
const NETWORK_HEADERS: (&[&str], &[&str]) = (&["NAME"], &["NETWORK ID", "DRIVER", "SCOPE"]);
const VOLUME_HEADERS: (&[&str], &[&str]) = (&["VOLUME NAME"], &["DRIVER"]);

/// Captured result of one external process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns external processes; swapped for a scripted runner in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runs commands as real child processes. Timeouts are left to the engine.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// [`ContainerEngine`] backed by a docker-compatible CLI.
///
/// Stdout is the only data channel; a non-zero exit code is the only
/// failure signal and stderr is kept as diagnostic text.
pub struct DockerCliEngine {
    binary: String,
    runner: Arc<dyn CommandRunner>,
}

enum Failure {
    Query,
    Exec,
}

impl DockerCliEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self::with_runner(binary, Arc::new(ProcessRunner))
    }

    pub fn with_runner(binary: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.binary.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn invoke(&self, args: Vec<String>) -> Result<CommandOutput, EngineError> {
        debug!("engine: {}", self.command_line(&args));
        self.runner
            .run(&self.binary, &args)
            .await
            .map_err(|source| EngineError::Spawn {
                command: self.command_line(&args),
                source,
            })
    }

    async fn checked(&self, args: Vec<String>, failure: Failure) -> Result<String, EngineError> {
        let output = self.invoke(args.clone()).await?;
        if output.success() {
            return Ok(output.stdout);
        }
        let command = self.command_line(&args);
        let exit_code = output.exit_code;
        let stderr = output.stderr.trim().to_string();
        Err(match failure {
            Failure::Query => EngineError::EngineQueryFailed { command, exit_code, stderr },
            Failure::Exec => EngineError::EngineExecFailed { command, exit_code, stderr },
        })
    }

    async fn query(&self, args: &[&str]) -> Result<String, EngineError> {
        self.checked(to_args(args), Failure::Query).await
    }

    async fn exec(&self, args: &[&str]) -> Result<String, EngineError> {
        self.checked(to_args(args), Failure::Exec).await
    }

    /// Non-zero exit maps to `false` instead of an error
    async fn attempt(&self, args: &[&str]) -> Result<bool, EngineError> {
        let args = to_args(args);
        let output = self.invoke(args.clone()).await?;
        if !output.success() {
            debug!(
                "engine: `{}` declined: {}",
                self.command_line(&args),
                output.stderr.trim()
            );
        }
        Ok(output.success())
    }

    async fn query_table(
        &self,
        args: &[&str],
        (required, optional): (&[&str], &[&str]),
    ) -> Result<Vec<TableRow>, EngineError> {
        let stdout = self.query(args).await?;
        parse_table(&stdout, required, optional).map_err(|e| self.malformed(args, e))
    }

    fn malformed(&self, args: &[&str], err: TableParseError) -> EngineError {
        EngineError::MalformedEngineOutput {
            command: self.command_line(&to_args(args)),
            detail: err.to_string(),
        }
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, EngineError> {
        let args: &[&str] = if include_stopped { &["ps", "-a"] } else { &["ps"] };
        let rows = self.query_table(args, CONTAINER_HEADERS).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| ContainerRecord {
                id: row.take("CONTAINER ID"),
                image: row.take("IMAGE"),
                status: row.take("STATUS"),
                ports: row.take("PORTS"),
                name: row.take("NAMES"),
            })
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, EngineError> {
        let rows = self.query_table(&["network", "ls"], NETWORK_HEADERS).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| NetworkRecord {
                id: row.take("NETWORK ID"),
                name: row.take("NAME"),
                driver: row.take("DRIVER"),
                scope: row.take("SCOPE"),
            })
            .collect())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, EngineError> {
        let rows = self.query_table(&["volume", "ls"], VOLUME_HEADERS).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| VolumeRecord {
                driver: row.take("DRIVER"),
                name: row.take("VOLUME NAME"),
            })
            .collect())
    }

    async fn container_exists(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self
            .list_containers(true)
            .await?
            .iter()
            .any(|c| c.has_name(name)))
    }

    async fn is_running(&self, name: &str) -> Result<bool, EngineError> {
        let args = ["inspect", "--format", "{{.State.Running}}", name];
        let stdout = self.query(&args).await?;
        match stdout.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(EngineError::MalformedEngineOutput {
                command: self.command_line(&to_args(&args)),
                detail: format!("expected 'true' or 'false', got '{}'", other),
            }),
        }
    }

    async fn start(&self, name: &str) -> Result<(), EngineError> {
        self.exec(&["start", name]).await.map(drop)
    }

    async fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.exec(&["stop", name]).await.map(drop)
    }

    async fn restart(&self, name: &str) -> Result<(), EngineError> {
        self.exec(&["restart", name]).await.map(drop)
    }

    async fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.exec(&["rm", name]).await.map(drop)
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<(), EngineError> {
        let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), spec.name.clone()];
        for (host, container) in &spec.published_ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host, container));
        }
        for bind in &spec.binds {
            args.push("-v".to_string());
            args.push(bind.clone());
        }
        for host in &spec.extra_hosts {
            args.push("--add-host".to_string());
            args.push(host.clone());
        }
        args.push(spec.image.clone());
        self.checked(args, Failure::Exec).await.map(drop)
    }

    async fn remove_volume(&self, name: &str) -> Result<bool, EngineError> {
        self.attempt(&["volume", "rm", name]).await
    }

    async fn remove_network(&self, name: &str) -> Result<bool, EngineError> {
        self.attempt(&["network", "rm", name]).await
    }

    async fn execute(&self, container: &str, command: &[&str]) -> Result<String, EngineError> {
        let args: Vec<&str> = ["exec", container].into_iter().chain(command.iter().copied()).collect();
        self.exec(&args).await
    }
}
