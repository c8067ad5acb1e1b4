// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod addons;
pub mod cloud;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod gitops;
pub mod kubernetes;
pub mod orchestrator;
pub mod outputs;
pub mod plan;
pub mod poll;
pub mod provision;
pub mod refresh;
pub mod registry;
pub mod remote;
pub mod types;

#[cfg(test)]
pub mod test_utils;
