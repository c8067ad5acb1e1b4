// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for client creation, CRD readiness, manifest apply and namespace management.

pub mod apply;
pub mod client;
pub mod crd;
pub mod namespaces;

pub use apply::{apply_manifest, ManifestRef};
pub use client::{client_from_kubeconfig, config_from_kubeconfig};
pub use crd::wait_for_crds_established;
pub use namespaces::ensure_namespace_exists;
