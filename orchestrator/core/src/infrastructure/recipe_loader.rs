// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! YAML-backed [`RecipeSource`]

use crate::domain::recipe::{Recipe, RecipeError, RecipeSource};
use std::path::{Path, PathBuf};

pub struct YamlRecipeLoader {
    file_name: String,
}

impl YamlRecipeLoader {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl RecipeSource for YamlRecipeLoader {
    fn load(&self, path: &Path) -> Result<Recipe, RecipeError> {
        if !path.is_file() {
            return Err(RecipeError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| RecipeError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let recipe: Recipe = serde_yaml::from_str(&content).map_err(|e| RecipeError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        recipe.validate()?;
        Ok(recipe)
    }

    fn discover(&self, dir: &Path) -> Result<(PathBuf, Recipe), RecipeError> {
        let path = dir.join(&self.file_name);
        let recipe = self.load(&path)?;
        Ok((path, recipe))
    }
}
