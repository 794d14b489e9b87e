// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod docker_cli;
pub mod proxy_routes;
pub mod recipe_loader;
pub mod registry;
pub mod table;

pub use docker_cli::{CommandOutput, CommandRunner, DockerCliEngine, ProcessRunner};
pub use recipe_loader::YamlRecipeLoader;
pub use registry::{ConflictResolution, InstanceRegistry, Registration, RegistryError};
