// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart releases through the `helm` CLI.

use crate::error::{Result, SeedError};
use crate::outputs::write_private_file;
use crate::plan::HelmRelease;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tokio::process::Command;
use tracing::{info, instrument};

/// Installs releases with `helm upgrade --install --wait`
#[derive(Debug, Clone)]
pub struct HelmInstaller {
    binary: String,
}

impl HelmInstaller {
    pub fn new(binary: impl Into<String>) -> Self {
        HelmInstaller {
            binary: binary.into(),
        }
    }

    fn args(
        &self,
        release: &HelmRelease,
        kubeconfig: &Path,
        values: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.name.clone(),
            release.chart.clone(),
            "--repo".to_string(),
            release.repository.clone(),
            "--version".to_string(),
            release.version.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", release.timeout.as_secs()),
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
        ];
        if let Some(values) = values {
            args.push("--values".to_string());
            args.push(values.display().to_string());
        }
        args
    }

    /// Install or upgrade `release`, returning once helm reports it deployed
    #[instrument(skip(self, release, kubeconfig), fields(release = %release.name, version = %release.version))]
    pub async fn install(&self, release: &HelmRelease, kubeconfig: &SecretString) -> Result<()> {
        let release_error = |message: String| SeedError::Release {
            name: release.name.clone(),
            message,
        };

        let workdir = tempfile::tempdir()?;
        let kubeconfig_path = workdir.path().join("kubeconfig");
        write_private_file(&kubeconfig_path, kubeconfig.expose_secret())?;

        let values_path = if release.values.is_null() {
            None
        } else {
            let path = workdir.path().join("values.yaml");
            let rendered = serde_yaml::to_string(&release.values)
                .map_err(|e| release_error(format!("invalid values: {}", e)))?;
            std::fs::write(&path, rendered)?;
            Some(path)
        };

        info!(
            "Installing {} {} into {}",
            release.chart, release.version, release.namespace
        );
        let output = Command::new(&self.binary)
            .args(self.args(release, &kubeconfig_path, values_path.as_deref()))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| release_error(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(release_error(format!("helm upgrade failed: {}", stderr.trim())));
        }

        info!("Release {} deployed", release.name);
        Ok(())
    }
}
