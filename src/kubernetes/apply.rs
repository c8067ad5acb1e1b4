// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Server-side apply of untyped manifests

use crate::constants::FIELD_MANAGER;
use crate::error::{Result, SeedError};
use crate::kubernetes::namespaces::ensure_namespace_exists;
use kube::api::{DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::{pinned_kind, Scope};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, instrument};

/// Identity of a manifest as read from its own fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    pub gvk: GroupVersionKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl ManifestRef {
    pub fn from_value(obj: &Value) -> Result<Self> {
        let field = |pointer: &str| obj.pointer(pointer).and_then(Value::as_str);

        let kind = field("/kind").ok_or_else(|| SeedError::apply("manifest", "missing kind"))?;
        let api_version = field("/apiVersion")
            .ok_or_else(|| SeedError::apply(kind, "missing apiVersion"))?;
        let name = field("/metadata/name")
            .ok_or_else(|| SeedError::apply(kind, "missing metadata.name"))?;

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };

        Ok(ManifestRef {
            gvk: GroupVersionKind::gvk(group, version, kind),
            name: name.to_string(),
            namespace: field("/metadata/namespace").map(str::to_string),
        })
    }
}

impl std::fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.gvk.kind, ns, self.name),
            None => write!(f, "{}/{}", self.gvk.kind, self.name),
        }
    }
}

/// Server-side apply `obj`, resolving its API through discovery.
///
/// The object's namespace is created first when missing. Returns once the
/// API server has acknowledged the apply.
#[instrument(skip(client, obj))]
pub async fn apply_manifest(client: &Client, obj: &Value) -> Result<ManifestRef> {
    let target = ManifestRef::from_value(obj)?;
    let resource = target.to_string();

    let (api_resource, caps) = pinned_kind(client, &target.gvk)
        .await
        .map_err(|e| SeedError::apply(&resource, format!("unknown resource type: {}", e)))?;

    let api: Api<DynamicObject> = match (&caps.scope, &target.namespace) {
        (Scope::Namespaced, Some(ns)) => {
            ensure_namespace_exists(client, ns).await?;
            Api::namespaced_with(client.clone(), ns, &api_resource)
        }
        (Scope::Namespaced, None) => Api::default_namespaced_with(client.clone(), &api_resource),
        (Scope::Cluster, _) => Api::all_with(client.clone(), &api_resource),
    };

    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&target.name, &params, &Patch::Apply(obj))
        .await
        .map_err(|e| SeedError::apply(&resource, e))?;

    debug!("Applied {}", resource);
    Ok(target)
}
