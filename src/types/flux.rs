// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Where the cluster pulls its desired state from
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "GitRepository"
)]
#[kube(namespaced)]
#[kube(status = "FluxStatus")]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    pub url: String,
    pub interval: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
}

/// Revision selector; the most specific field set wins on the controller side
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

/// One application synced from a source
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "kustomize.toolkit.fluxcd.io",
    version = "v1",
    kind = "Kustomization"
)]
#[kube(namespaced)]
#[kube(status = "FluxStatus")]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSpec {
    pub interval: String,
    pub path: String,
    pub prune: bool,
    pub wait: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    pub source_ref: CrossNamespaceSourceReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_build: Option<PostBuild>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrossNamespaceSourceReference {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostBuild {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substitute_from: Vec<SubstituteReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubstituteReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_git_repository_serializes_ref_field() {
        let repo = GitRepository::new(
            "platform",
            GitRepositorySpec {
                url: "https://github.com/example/platform".to_string(),
                interval: "1m0s".to_string(),
                reference: Some(GitReference {
                    branch: Some("main".to_string()),
                    ..Default::default()
                }),
                secret_ref: None,
            },
        );
        let value = serde_json::to_value(&repo).unwrap();

        assert_eq!(value["apiVersion"], "source.toolkit.fluxcd.io/v1");
        assert_eq!(value["kind"], "GitRepository");
        assert_eq!(value["spec"]["ref"]["branch"], "main");
        assert!(value["spec"].get("secretRef").is_none());
        assert!(value["spec"]["ref"].get("tag").is_none());
    }

    #[test]
    fn test_kustomization_api_identity() {
        assert_eq!(Kustomization::group(&()), "kustomize.toolkit.fluxcd.io");
        assert_eq!(Kustomization::kind(&()), "Kustomization");
        assert_eq!(Kustomization::plural(&()), "kustomizations");
    }

    #[test]
    fn test_status_conditions_deserialize() {
        let status: FluxStatus = serde_json::from_value(serde_json::json!({
            "observedGeneration": 2,
            "conditions": [{"type": "Ready", "status": "True", "reason": "Succeeded"}]
        }))
        .unwrap();

        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.conditions[0].condition_type, "Ready");
        assert_eq!(status.conditions[0].reason.as_deref(), Some("Succeeded"));
    }
}
