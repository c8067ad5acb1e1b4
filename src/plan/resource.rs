// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// A chart release installed through the package manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    pub chart: String,
    pub repository: String,
    pub version: String,
    pub namespace: String,
    pub values: Value,
    /// CRDs that must report Established before the release counts as installed
    pub crds: Vec<String>,
    #[serde(skip)]
    pub timeout: Duration,
}

/// Something the pipeline submits to the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredResource {
    Release(HelmRelease),
    /// Free-form manifest, server-side applied as-is
    Manifest(Value),
}

impl DeclaredResource {
    pub fn kind(&self) -> String {
        match self {
            DeclaredResource::Release(_) => "HelmRelease".to_string(),
            DeclaredResource::Manifest(obj) => obj
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
        }
    }

    /// Desired state used to detect changes between upserts
    pub fn content(&self) -> Value {
        match self {
            DeclaredResource::Release(release) => {
                serde_json::to_value(release).unwrap_or(Value::Null)
            }
            DeclaredResource::Manifest(obj) => obj.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of_manifest_and_release() {
        let manifest = DeclaredResource::Manifest(json!({"kind": "ConfigMap"}));
        assert_eq!(manifest.kind(), "ConfigMap");

        let release = DeclaredResource::Release(HelmRelease {
            name: "flux".to_string(),
            chart: "flux2".to_string(),
            repository: "https://fluxcd-community.github.io/helm-charts".to_string(),
            version: "2.14.1".to_string(),
            namespace: "flux-system".to_string(),
            values: Value::Null,
            crds: vec![],
            timeout: Duration::from_secs(600),
        });
        assert_eq!(release.kind(), "HelmRelease");
        assert_eq!(release.content()["version"], "2.14.1");
    }
}
