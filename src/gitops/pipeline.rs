// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dependency-ordered apply of the GitOps resources.
//!
//! The release comes first and only counts as applied once its CRDs are
//! established. The source follows, then the substitution map, then one
//! deployment descriptor per application, then the refresh job.

use super::manifests::{git_repository, kustomization, operator_release, substitution_config_map};
use crate::config::DeploymentSpec;
use crate::error::{Result, SeedError};
use crate::plan::{DeclaredResource, Plan};
use crate::refresh::refresh_manifests;
use crate::registry::ResourceRegistry;
use futures::future::try_join_all;
use tracing::{error, info, instrument};

pub fn release_node(name: &str) -> String {
    format!("release/{}", name)
}

pub fn source_node(name: &str) -> String {
    format!("source/{}", name)
}

pub fn config_node(name: &str) -> String {
    format!("config/{}", name)
}

pub fn deployment_node(name: &str) -> String {
    format!("deployment/{}", name)
}

/// Build the resource graph for `spec` with explicit dependency edges
pub fn build_plan(spec: &DeploymentSpec) -> Result<Plan> {
    let gitops = &spec.gitops;
    let namespace = gitops.release.namespace.as_str();
    let mut plan = Plan::new();

    let release = release_node(&gitops.release.name);
    plan.add(
        release.clone(),
        DeclaredResource::Release(operator_release(&gitops.release)),
        &[],
    )?;

    let source = source_node(&gitops.source.name);
    plan.add(
        source.clone(),
        DeclaredResource::Manifest(git_repository(&gitops.source, namespace, &spec.name)?),
        &[release.as_str()],
    )?;

    let config = config_node(&gitops.substitutions.name);
    plan.add(
        config.clone(),
        DeclaredResource::Manifest(substitution_config_map(
            &gitops.substitutions,
            namespace,
            &spec.name,
        )?),
        &[source.as_str()],
    )?;

    let mut deployments = Vec::new();
    for deployment in &gitops.deployments {
        let node = deployment_node(&deployment.name);
        plan.add(
            node.clone(),
            DeclaredResource::Manifest(kustomization(
                deployment,
                &gitops.source.name,
                &gitops.substitutions.name,
                namespace,
                &spec.name,
            )?),
            &[source.as_str(), config.as_str()],
        )?;
        deployments.push(node);
    }

    if let Some(refresh) = &spec.registry.refresh {
        let manifests = refresh_manifests(refresh, &spec.region)?;
        let deps: Vec<&str> = deployments.iter().map(String::as_str).collect();
        let (job, rbac) = manifests
            .split_last()
            .ok_or_else(|| SeedError::Plan("refresh job declares no manifests".to_string()))?;

        let mut job_deps = deps.clone();
        for (name, manifest) in rbac {
            plan.add(name.clone(), DeclaredResource::Manifest(manifest.clone()), &deps)?;
            job_deps.push(name.as_str());
        }
        plan.add(
            job.0.clone(),
            DeclaredResource::Manifest(job.1.clone()),
            &job_deps,
        )?;
    }

    Ok(plan)
}

/// Submit `plan` layer by layer and return the applied node names, layer by layer.
///
/// A layer's resources are submitted together; the next layer starts only
/// after every one of them is acknowledged. The first failure aborts the run.
#[instrument(skip(plan, registry), fields(resources = plan.len()))]
pub async fn execute(plan: &Plan, registry: &ResourceRegistry) -> Result<Vec<String>> {
    let layers = plan.layers()?;
    let total = layers.len();
    let mut applied = Vec::with_capacity(plan.len());

    for (index, layer) in layers.into_iter().enumerate() {
        let names: Vec<&str> = layer.iter().map(|node| node.name.as_str()).collect();
        info!("Applying layer {}/{}: {}", index + 1, total, names.join(", "));

        try_join_all(
            layer
                .iter()
                .map(|node| registry.upsert(&node.name, &node.resource)),
        )
        .await
        .map_err(|e| {
            error!(
                "Layer {}/{} failed, {} later layers not applied: {}",
                index + 1,
                total,
                total - index - 1,
                e
            );
            e
        })?;

        applied.extend(names.into_iter().map(str::to_string));
    }

    info!("Applied {} resources", applied.len());
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{deployment_spec, resource_key, RecordingBackend};
    use std::sync::Arc;
    use std::time::Duration;

    fn spec_with_refresh() -> DeploymentSpec {
        let mut spec = deployment_spec();
        spec.registry.refresh =
            Some(serde_yaml::from_str("image: ghcr.io/example/kubeseed:0.1.0").unwrap());
        spec
    }

    #[test]
    fn test_plan_layers_match_pipeline_order() {
        let plan = build_plan(&deployment_spec()).unwrap();
        let layers: Vec<Vec<String>> = plan
            .layers()
            .unwrap()
            .iter()
            .map(|layer| layer.iter().map(|n| n.name.clone()).collect())
            .collect();

        assert_eq!(
            layers,
            vec![
                vec!["release/flux"],
                vec!["source/platform"],
                vec!["config/cluster-vars"],
                vec!["deployment/infrastructure", "deployment/apps"],
            ]
        );
    }

    #[test]
    fn test_refresh_job_follows_deployments() {
        let plan = build_plan(&spec_with_refresh()).unwrap();
        let layers = plan.layers().unwrap();

        assert_eq!(layers.len(), 6);
        assert_eq!(layers[4].len(), 3);
        assert_eq!(layers[5][0].name, "registry-credential-refresh/cron-job");
        let job = plan.node("registry-credential-refresh/cron-job").unwrap();
        assert!(job.depends_on.contains(&"deployment/apps".to_string()));
    }

    #[tokio::test]
    async fn test_execute_acknowledges_in_layer_order() {
        let backend = Arc::new(RecordingBackend::new());
        let registry = ResourceRegistry::new(backend.clone());
        let plan = build_plan(&deployment_spec()).unwrap();

        let applied = execute(&plan, &registry).await.unwrap();

        assert_eq!(
            applied,
            vec![
                "release/flux",
                "source/platform",
                "config/cluster-vars",
                "deployment/infrastructure",
                "deployment/apps",
            ]
        );
        assert_eq!(
            backend.acknowledged(),
            vec![
                "HelmRelease/flux",
                "GitRepository/platform",
                "ConfigMap/cluster-vars",
                "Kustomization/infrastructure",
                "Kustomization/apps",
            ]
        );
        assert_eq!(registry.get("release/flux").unwrap().version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_submission_before_dependencies_acknowledged() {
        let keys = [
            "HelmRelease/flux",
            "GitRepository/platform",
            "ConfigMap/cluster-vars",
            "Kustomization/infrastructure",
            "Kustomization/apps",
            "ServiceAccount/registry-credential-refresh",
            "CronJob/registry-credential-refresh",
        ];
        let delays_ms = [0u64, 3, 7, 11, 17, 23, 31];

        // Rotate the delays across the resources so each one is at some point the slowest
        for shift in 0..delays_ms.len() {
            let mut backend = RecordingBackend::new();
            for (i, key) in keys.iter().enumerate() {
                let delay = delays_ms[(i + shift) % delays_ms.len()];
                backend = backend.with_delay(key, Duration::from_millis(delay));
            }
            let backend = Arc::new(backend);
            let registry = ResourceRegistry::new(backend.clone());
            let plan = build_plan(&spec_with_refresh()).unwrap();

            execute(&plan, &registry).await.unwrap();

            for layer in plan.layers().unwrap() {
                for node in layer {
                    let submission = backend.submission(&resource_key(&node.resource)).unwrap();
                    for dep in &node.depends_on {
                        let dep_key = resource_key(&plan.node(dep).unwrap().resource);
                        let dependency = backend.submission(&dep_key).unwrap();
                        assert!(
                            dependency.acked.unwrap() < submission.started,
                            "{} submitted before {} was acknowledged (shift {})",
                            node.name,
                            dep,
                            shift
                        );
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_layers() {
        let backend = Arc::new(RecordingBackend::new().failing("platform"));
        let registry = ResourceRegistry::new(backend.clone());
        let plan = build_plan(&deployment_spec()).unwrap();

        let result = execute(&plan, &registry).await;

        assert!(matches!(result, Err(SeedError::Apply { .. })));
        assert_eq!(
            backend.submitted(),
            vec!["HelmRelease/flux", "GitRepository/platform"]
        );
        assert!(registry.get("config/cluster-vars").is_none());
    }
}
