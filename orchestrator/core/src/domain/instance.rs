// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Instance Aggregate
//!
//! An instance is one registered deployment of a recipe. It is identified by
//! an opaque id that never changes, and by a human-chosen name prefix that
//! is unique across the registry and from which every container, volume
//! and network name is derived.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Instance identity, global config value, naming rules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque, immutable instance identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: InstanceId,
    pub recipe_location: PathBuf,
    pub name_prefix: String,
    /// Local port the primary service listens on when proxied
    pub proxy_port: Option<u16>,
}

impl Instance {
    pub fn new(id: InstanceId, recipe_location: impl Into<PathBuf>, name_prefix: impl Into<String>) -> Self {
        Self {
            id,
            recipe_location: recipe_location.into(),
            name_prefix: name_prefix.into(),
            proxy_port: None,
        }
    }

    pub fn with_proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = Some(port);
        self
    }

    pub fn names(&self) -> InstanceNames<'_> {
        InstanceNames::new(&self.name_prefix)
    }
}

/// The single mutable global value stored next to the registry.
/// Last writer wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub active_instance: Option<InstanceId>,

    #[serde(default)]
    pub proxy_mode_enabled: bool,
}

/// One field of [`GlobalConfig`], used for whole-value rewrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalField {
    ActiveInstance(Option<InstanceId>),
    ProxyModeEnabled(bool),
}

impl GlobalConfig {
    pub fn apply(&mut self, field: GlobalField) {
        match field {
            GlobalField::ActiveInstance(id) => self.active_instance = id,
            GlobalField::ProxyModeEnabled(enabled) => self.proxy_mode_enabled = enabled,
        }
    }
}

// ============================================================================
// Naming rules
// ============================================================================

/// Services every instance is expected to run, in start order
pub const EXPECTED_SERVICES: &[&str] = &["app", "db"];

/// Suffix of on-demand auxiliary containers (test runners)
const AUXILIARY_MARKER: &str = "behat";

/// Deterministic engine object names derived from a name prefix
#[derive(Debug, Clone, Copy)]
pub struct InstanceNames<'a> {
    prefix: &'a str,
}

impl<'a> InstanceNames<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    pub fn container(&self, service: &str) -> String {
        format!("{}-{}", self.prefix, service)
    }

    pub fn primary_container(&self) -> String {
        self.container(EXPECTED_SERVICES[0])
    }

    /// Default expected set, used when the recipe is unavailable
    pub fn expected_containers(&self) -> Vec<String> {
        self.containers_for(EXPECTED_SERVICES)
    }

    pub fn containers_for<S: AsRef<str>>(&self, services: &[S]) -> Vec<String> {
        services.iter().map(|s| self.container(s.as_ref())).collect()
    }

    /// Containers matched by `stop`: the expected set plus `{prefix}-behat*`
    pub fn matches_stoppable(&self, name: &str, expected: &[String]) -> bool {
        expected.iter().any(|n| n == name)
            || name.starts_with(&format!("{}-{}", self.prefix, AUXILIARY_MARKER))
    }

    /// Volumes and networks belong to the instance when named `{prefix}-*`
    /// or `{prefix}_*` (compose project naming)
    pub fn owns_resource(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix)
            .map(|rest| rest.starts_with('-') || rest.starts_with('_'))
            .unwrap_or(false)
    }

    /// Like [`owns_resource`](Self::owns_resource), but a resource also
    /// matched by a longer registered prefix (`demo-x_data` for `demo` and
    /// `demo-x`) belongs to that more specific instance
    pub fn owns_resource_among(&self, name: &str, registered: &[String]) -> bool {
        self.owns_resource(name)
            && !registered.iter().any(|other| {
                other.len() > self.prefix.len() && InstanceNames::new(other).owns_resource(name)
            })
    }
}
