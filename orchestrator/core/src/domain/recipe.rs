// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recipe port
//!
//! The recipe is produced and validated elsewhere; the lifecycle core only
//! reads the few fields it needs from it.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::instance::{InstanceNames, EXPECTED_SERVICES};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recipe {
    pub name_prefix: String,

    /// Hostname served through the shared proxy
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_services")]
    pub services: Vec<String>,
}

fn default_services() -> Vec<String> {
    EXPECTED_SERVICES.iter().map(|s| s.to_string()).collect()
}

impl Recipe {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            host: None,
            services: default_services(),
        }
    }

    /// Containers `start`, `stop` and `destroy` act on, in start order. An
    /// empty service list falls back to the default set.
    pub fn expected_containers(&self) -> Vec<String> {
        let names = InstanceNames::new(&self.name_prefix);
        if self.services.is_empty() {
            names.expected_containers()
        } else {
            names.containers_for(&self.services)
        }
    }

    pub fn primary_container_name(&self) -> String {
        match self.services.first() {
            Some(service) => InstanceNames::new(&self.name_prefix).container(service),
            None => InstanceNames::new(&self.name_prefix).primary_container(),
        }
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.name_prefix.is_empty() {
            return Err(RecipeError::Invalid("name_prefix cannot be empty".to_string()));
        }
        if self
            .name_prefix
            .chars()
            .any(|c| c == '|' || c == '/' || c.is_whitespace())
        {
            return Err(RecipeError::Invalid(format!(
                "name_prefix '{}' may not contain '|', '/' or whitespace",
                self.name_prefix
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Recipe not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse recipe {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid recipe: {0}")]
    Invalid(String),
}

/// Read-only access to recipes
pub trait RecipeSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<Recipe, RecipeError>;

    /// Locate and load the recipe that lives in `dir`
    fn discover(&self, dir: &Path) -> Result<(PathBuf, Recipe), RecipeError>;
}
