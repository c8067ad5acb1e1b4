// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-cluster declaration of the scheduled pull credential refresh.

use crate::config::RefreshConfig;
use crate::constants::{labels, refresh, FIELD_MANAGER};
use crate::error::{Result, SeedError};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, SecretKeySelector, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use kube::api::ObjectMeta;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Subcommand the job's container runs
pub const REFRESH_COMMAND: &str = "refresh-pull-secrets";

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(BTreeMap::from([(
            labels::MANAGED_BY.to_string(),
            FIELD_MANAGER.to_string(),
        )])),
        ..Default::default()
    }
}

fn to_value<T: Serialize>(name: &str, obj: &T) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| SeedError::apply(name, e))
}

fn rule(resource: &str, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![String::new()]),
        resources: Some(vec![resource.to_string()]),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: name.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Identity, permissions and schedule of the refresh job, as (logical name, manifest).
///
/// The CronJob comes last; it only works once the others exist.
pub fn refresh_manifests(config: &RefreshConfig, region: &str) -> Result<Vec<(String, Value)>> {
    let name = refresh::JOB_NAME;
    let namespace = config.namespace.as_str();

    let service_account = ServiceAccount {
        metadata: metadata(name, Some(namespace)),
        ..Default::default()
    };

    let role = ClusterRole {
        metadata: metadata(name, None),
        rules: Some(vec![
            rule("secrets", &["get", "create", "delete"]),
            rule("serviceaccounts", &["get", "patch"]),
        ]),
        ..Default::default()
    };

    let binding = ClusterRoleBinding {
        metadata: metadata(name, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    };

    let container = Container {
        name: "refresh".to_string(),
        image: Some(config.image.clone()),
        args: Some(vec![REFRESH_COMMAND.to_string()]),
        env: Some(vec![
            EnvVar {
                name: "AWS_REGION".to_string(),
                value: Some(region.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "RUST_LOG".to_string(),
                value: Some("info".to_string()),
                ..Default::default()
            },
            secret_env("AWS_ACCESS_KEY_ID", &config.aws_credentials_secret),
            secret_env("AWS_SECRET_ACCESS_KEY", &config.aws_credentials_secret),
        ]),
        ..Default::default()
    };

    let cron_job = CronJob {
        metadata: metadata(name, Some(namespace)),
        spec: Some(CronJobSpec {
            schedule: config.schedule.clone(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(1),
            failed_jobs_history_limit: Some(3),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    backoff_limit: Some(2),
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            service_account_name: Some(name.to_string()),
                            restart_policy: Some("Never".to_string()),
                            containers: vec![container],
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(vec![
        (
            format!("{}/service-account", name),
            to_value(name, &service_account)?,
        ),
        (format!("{}/cluster-role", name), to_value(name, &role)?),
        (
            format!("{}/cluster-role-binding", name),
            to_value(name, &binding)?,
        ),
        (format!("{}/cron-job", name), to_value(name, &cron_job)?),
    ])
}
