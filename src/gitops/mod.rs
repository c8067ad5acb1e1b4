// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod manifests;
pub mod pipeline;

pub use pipeline::{build_plan, execute};
