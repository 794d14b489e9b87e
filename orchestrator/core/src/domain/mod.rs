// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types and ports
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Instance identity, engine records, recipe and settings

pub mod engine;
pub mod instance;
pub mod recipe;
pub mod settings;
