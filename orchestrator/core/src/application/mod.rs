// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod lifecycle;
pub mod proxy_reconciler;

pub use lifecycle::{LifecycleError, LifecycleService, StepOutcome, StepResult, StopTarget};
pub use proxy_reconciler::{ProxyAction, ProxyContainerState, ProxyError, ProxyReconciler};
