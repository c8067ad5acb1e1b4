// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The refresh run executed inside the cluster by the scheduled job.
//!
//! Every namespace is handled on its own: a failure in one is logged and the
//! run moves on to the next.

use super::token::RegistryToken;
use crate::constants::{labels, refresh, FIELD_MANAGER};
use crate::error::{Result, SeedError};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceOutcome {
    Refreshed,
    /// The secret was recreated but the service account to patch does not exist yet
    IdentityMissing,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: Vec<(String, NamespaceOutcome)>,
}

impl RefreshReport {
    pub fn count(&self, outcome: &NamespaceOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| o == outcome).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, NamespaceOutcome::Failed(_)))
            .count()
    }

    /// The run only fails when no namespace could be handled
    pub fn into_result(self) -> Result<Self> {
        if !self.outcomes.is_empty() && self.failed() == self.outcomes.len() {
            return Err(SeedError::Refresh(format!(
                "all {} namespaces failed",
                self.outcomes.len()
            )));
        }
        Ok(self)
    }
}

pub struct PullSecretRefresher {
    client: Client,
    secret_name: String,
    service_account: String,
}

impl PullSecretRefresher {
    pub fn new(client: Client) -> Self {
        PullSecretRefresher {
            client,
            secret_name: refresh::SECRET_NAME.to_string(),
            service_account: refresh::SERVICE_ACCOUNT.to_string(),
        }
    }

    /// Recreate the pull secret in every namespace, attempting all of them
    pub async fn run(&self, token: &RegistryToken, namespaces: &[&str]) -> RefreshReport {
        let mut report = RefreshReport::default();
        for namespace in namespaces {
            let outcome = match self.refresh_namespace(namespace, token).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Refreshing pull secret in {} failed: {}", namespace, e);
                    NamespaceOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push((namespace.to_string(), outcome));
        }
        info!(
            "Refresh finished: {} refreshed, {} without service account, {} failed",
            report.count(&NamespaceOutcome::Refreshed),
            report.count(&NamespaceOutcome::IdentityMissing),
            report.failed()
        );
        report
    }

    #[instrument(skip(self, token))]
    async fn refresh_namespace(
        &self,
        namespace: &str,
        token: &RegistryToken,
    ) -> Result<NamespaceOutcome> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        // Delete before create so a stale token never survives
        match secrets
            .delete(&self.secret_name, &DeleteParams::default())
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(err)) if err.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
        secrets
            .create(&PostParams::default(), &self.pull_secret(namespace, token))
            .await?;

        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "imagePullSecrets": [{"name": self.secret_name}]
        });
        match accounts
            .patch(
                &self.service_account,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => {
                info!("Refreshed pull secret in {}", namespace);
                Ok(NamespaceOutcome::Refreshed)
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                warn!(
                    "Service account {}/{} does not exist yet, secret created without it",
                    namespace, self.service_account
                );
                Ok(NamespaceOutcome::IdentityMissing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn pull_secret(&self, namespace: &str, token: &RegistryToken) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    labels::MANAGED_BY.to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                ByteString(token.docker_config_json().into_bytes()),
            )])),
            ..Default::default()
        }
    }
}
