// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::config::{DeploymentConfig, ReleaseConfig, SourceConfig, SubstitutionConfig};
use crate::constants::{labels, FIELD_MANAGER};
use crate::error::{Result, SeedError};
use crate::plan::HelmRelease;
use crate::types::flux::{
    CrossNamespaceSourceReference, GitReference, LocalObjectReference, PostBuild,
    SubstituteReference,
};
use crate::types::{GitRepository, GitRepositorySpec, Kustomization, KustomizationSpec};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

fn metadata(name: &str, namespace: &str, deployment: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([
            (labels::MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
            (labels::DEPLOYMENT.to_string(), deployment.to_string()),
        ])),
        ..Default::default()
    }
}

fn to_value<T: Serialize>(name: &str, obj: &T) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| SeedError::apply(name, e))
}

/// The GitOps operator chart
pub fn operator_release(config: &ReleaseConfig) -> HelmRelease {
    HelmRelease {
        name: config.name.clone(),
        chart: config.chart.clone(),
        repository: config.repository.clone(),
        version: config.version.clone(),
        namespace: config.namespace.clone(),
        values: config.values.clone(),
        crds: config.crds.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    }
}

/// Source-of-truth pointer: pull location plus revision selector
pub fn git_repository(source: &SourceConfig, namespace: &str, deployment: &str) -> Result<Value> {
    let reference = GitReference {
        branch: source.branch.clone(),
        tag: source.tag.clone(),
        commit: source.commit.clone(),
    };
    let mut repo = GitRepository::new(
        &source.name,
        GitRepositorySpec {
            url: source.url.clone(),
            interval: source.interval.clone(),
            reference: (reference != GitReference::default()).then_some(reference),
            secret_ref: source
                .secret_ref
                .as_ref()
                .map(|name| LocalObjectReference { name: name.clone() }),
        },
    );
    repo.metadata = metadata(&source.name, namespace, deployment);
    to_value(&source.name, &repo)
}

/// Key-value map that deployments substitute into their manifests
pub fn substitution_config_map(
    substitutions: &SubstitutionConfig,
    namespace: &str,
    deployment: &str,
) -> Result<Value> {
    let config_map = ConfigMap {
        metadata: metadata(&substitutions.name, namespace, deployment),
        data: Some(substitutions.data.clone()),
        ..Default::default()
    };
    to_value(&substitutions.name, &config_map)
}

/// Deployment descriptor that syncs one path of the source into its own namespace
pub fn kustomization(
    config: &DeploymentConfig,
    source_name: &str,
    substitutions_name: &str,
    namespace: &str,
    deployment: &str,
) -> Result<Value> {
    let mut kustomization = Kustomization::new(
        &config.name,
        KustomizationSpec {
            interval: config.interval.clone(),
            path: config.path.clone(),
            prune: config.prune,
            wait: config.wait,
            timeout: config.timeout.clone(),
            source_ref: CrossNamespaceSourceReference {
                kind: GitRepository::kind(&()).to_string(),
                name: source_name.to_string(),
                namespace: Some(namespace.to_string()),
            },
            target_namespace: Some(config.target_namespace.clone()),
            post_build: Some(PostBuild {
                substitute_from: vec![SubstituteReference {
                    kind: "ConfigMap".to_string(),
                    name: substitutions_name.to_string(),
                    optional: false,
                }],
            }),
        },
    );
    kustomization.metadata = metadata(&config.name, namespace, deployment);
    to_value(&config.name, &kustomization)
}
