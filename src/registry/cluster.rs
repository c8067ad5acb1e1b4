// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::ApplyBackend;
use crate::addons::HelmInstaller;
use crate::error::Result;
use crate::kubernetes::{apply_manifest, wait_for_crds_established};
use crate::plan::HelmRelease;
use async_trait::async_trait;
use kube::Client;
use secrecy::SecretString;
use serde_json::Value;
use tracing::info;

/// Applies declared resources to a live cluster
pub struct KubeBackend {
    client: Client,
    helm: HelmInstaller,
    kubeconfig: SecretString,
}

impl KubeBackend {
    pub fn new(client: Client, helm: HelmInstaller, kubeconfig: SecretString) -> Self {
        KubeBackend {
            client,
            helm,
            kubeconfig,
        }
    }
}

#[async_trait]
impl ApplyBackend for KubeBackend {
    async fn install_release(&self, release: &HelmRelease) -> Result<()> {
        self.helm.install(release, &self.kubeconfig).await?;
        // helm --wait covers workloads; CRDs are registered asynchronously
        wait_for_crds_established(&self.client, &release.crds).await?;
        info!("Release {} and its CRDs are ready", release.name);
        Ok(())
    }

    async fn apply_manifest(&self, manifest: &Value) -> Result<()> {
        apply_manifest(&self.client, manifest).await.map(|_| ())
    }
}
