// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Container Engine Port
//!
//! Observation records and the imperative operations the lifecycle layer
//! needs from the external container engine. Records are always derived
//! fresh from the engine and go stale after any mutation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image: String,
    /// Free text reported by the engine ("Up 3 minutes", "Exited (0) ...")
    pub status: String,
    pub ports: String,
    pub name: String,
}

impl ContainerRecord {
    pub fn is_up(&self) -> bool {
        self.status.starts_with("Up")
    }

    /// Every name in the `NAMES` cell; linked containers list several,
    /// comma-joined
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.name.split(',').map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// Host ports published by this container, ranges expanded
    pub fn published_host_ports(&self) -> Vec<u16> {
        self.ports
            .split(',')
            .filter_map(|binding| binding.trim().split_once("->").map(|(host, _)| host))
            .filter_map(|host| host.rsplit_once(':').map(|(_, port)| port))
            .flat_map(|port| match port.split_once('-') {
                Some((start, end)) => match (start.parse::<u16>(), end.parse::<u16>()) {
                    (Ok(start), Ok(end)) if start <= end => (start..=end).collect(),
                    _ => Vec::new(),
                },
                None => port.parse::<u16>().into_iter().collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRecord {
    pub driver: String,
    pub name: String,
}

/// Definition of a container the core creates itself (only the shared proxy)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `(host, container)` port pairs
    pub published_ports: Vec<(u16, u16)>,
    /// `host_path:container_path[:mode]`
    pub binds: Vec<String>,
    /// `hostname:address`
    pub extra_hosts: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed engine output for `{command}`: {detail}")]
    MalformedEngineOutput { command: String, detail: String },

    #[error("Engine query `{command}` failed (exit code {}): {stderr}", fmt_exit(.exit_code))]
    EngineQueryFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Engine command `{command}` failed (exit code {}): {stderr}", fmt_exit(.exit_code))]
    EngineExecFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn fmt_exit(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}

/// Gateway to the external container engine.
///
/// Implementations never retry; a failed engine call surfaces immediately.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>, EngineError>;

    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, EngineError>;

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, EngineError>;

    async fn container_exists(&self, name: &str) -> Result<bool, EngineError>;

    /// Fails with `EngineQueryFailed` when the container does not exist
    async fn is_running(&self, name: &str) -> Result<bool, EngineError>;

    async fn start(&self, name: &str) -> Result<(), EngineError>;

    async fn stop(&self, name: &str) -> Result<(), EngineError>;

    async fn restart(&self, name: &str) -> Result<(), EngineError>;

    async fn remove(&self, name: &str) -> Result<(), EngineError>;

    /// Stop then remove, so an external `up` can create it again
    async fn recreate(&self, name: &str) -> Result<(), EngineError> {
        self.stop(name).await?;
        self.remove(name).await
    }

    /// Create and start a detached container
    async fn run(&self, spec: &ContainerSpec) -> Result<(), EngineError>;

    /// `false` when the volume is already gone or still attached
    async fn remove_volume(&self, name: &str) -> Result<bool, EngineError>;

    /// `false` when the network is already gone or still in use
    async fn remove_network(&self, name: &str) -> Result<bool, EngineError>;

    /// Run a command in a running container and return its stdout
    async fn execute(&self, container: &str, command: &[&str]) -> Result<String, EngineError>;

    /// Whether any known container publishes `port` on the host
    async fn port_is_bound(&self, port: u16) -> Result<bool, EngineError> {
        Ok(self
            .list_containers(true)
            .await?
            .iter()
            .any(|c| c.published_host_ports().contains(&port)))
    }
}
