// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Versioned registry of everything submitted to the cluster.
//!
//! Entries are keyed by stable logical name. An upsert submits the resource
//! to the backend and, once acknowledged, records its content; the version
//! only moves when the content differs from what was recorded before.

pub mod cluster;

pub use cluster::KubeBackend;

use crate::error::{Result, SeedError};
use crate::plan::{DeclaredResource, HelmRelease};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Where declared resources end up
#[async_trait]
pub trait ApplyBackend: Send + Sync {
    /// Install or upgrade a release; returns once the release and its CRDs are ready
    async fn install_release(&self, release: &HelmRelease) -> Result<()>;

    /// Apply a manifest; returns once the API server has acknowledged it
    async fn apply_manifest(&self, manifest: &Value) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub kind: String,
    pub content: Value,
    pub version: u64,
}

pub struct ResourceRegistry {
    backend: Arc<dyn ApplyBackend>,
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
}

impl ResourceRegistry {
    pub fn new(backend: Arc<dyn ApplyBackend>) -> Self {
        ResourceRegistry {
            backend,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Submit `resource` under `name` and return its recorded version
    #[instrument(skip(self, resource), fields(kind = %resource.kind()))]
    pub async fn upsert(&self, name: &str, resource: &DeclaredResource) -> Result<u64> {
        match resource {
            DeclaredResource::Release(release) => self.backend.install_release(release).await,
            DeclaredResource::Manifest(manifest) => self.backend.apply_manifest(manifest).await,
        }
        .map_err(|e| match e {
            SeedError::Apply { .. } | SeedError::Release { .. } => e,
            other => SeedError::apply(name, other),
        })?;

        let content = resource.content();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SeedError::apply(name, "registry state poisoned"))?;
        let version = match entries.get_mut(name) {
            Some(entry) if entry.content == content => {
                debug!("{} unchanged at version {}", name, entry.version);
                entry.version
            }
            Some(entry) => {
                entry.version += 1;
                entry.kind = resource.kind();
                entry.content = content;
                info!("{} updated to version {}", name, entry.version);
                entry.version
            }
            None => {
                entries.insert(
                    name.to_string(),
                    RegistryEntry {
                        kind: resource.kind(),
                        content,
                        version: 1,
                    },
                );
                info!("{} created", name);
                1
            }
        };
        Ok(version)
    }

    pub fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.lock().ok()?.get(name).cloned()
    }
}
