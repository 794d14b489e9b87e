// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! devstack core
//!
//! Instance lifecycle control plane: the durable instance registry, the
//! container engine gateway that turns CLI table output into typed records,
//! and the reverse-proxy reconciliation that keeps routing in line with the
//! registry.
//!
//! # Architecture
//!
//! - **domain:** types, naming rules and the engine / recipe ports
//! - **infrastructure:** CLI engine, table parser, file registry, recipe loader
//! - **application:** lifecycle and proxy use cases

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
