// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod graph;
pub mod resource;

pub use graph::{Plan, PlanNode};
pub use resource::{DeclaredResource, HelmRelease};
