// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{bootstrap, poll::MAX_WAIT_SECS, refresh};

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the YAML deployment description
    pub deployment_file: PathBuf,
    /// Where outputs and the persisted private key are written
    pub output_dir: PathBuf,
    pub ssh_binary: String,
    pub helm_binary: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let deployment_file = env::var("DEPLOYMENT_FILE")
            .context("DEPLOYMENT_FILE environment variable not set")?;
        let output_dir = env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string());

        Ok(Config {
            deployment_file: PathBuf::from(deployment_file),
            output_dir: PathBuf::from(output_dir),
            ssh_binary: env::var("SSH_BINARY").unwrap_or_else(|_| "ssh".to_string()),
            helm_binary: env::var("HELM_BINARY").unwrap_or_else(|_| "helm".to_string()),
        })
    }

    /// Read and validate the deployment description
    pub fn load_deployment(&self) -> Result<DeploymentSpec> {
        let raw = std::fs::read_to_string(&self.deployment_file).with_context(|| {
            format!(
                "Failed to read deployment file {}",
                self.deployment_file.display()
            )
        })?;
        DeploymentSpec::from_yaml(&raw)
    }
}

/// Everything a single deployment declares
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub network: NetworkConfig,
    pub instance: InstanceConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub gitops: GitOpsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl DeploymentSpec {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let spec: DeploymentSpec =
            serde_yaml::from_str(raw).context("Failed to parse deployment file")?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("deployment name must not be empty");
        }
        if self.bootstrap.retries == 0 {
            anyhow::bail!("bootstrap.retries must be at least 1");
        }
        let probe_budget = u64::from(self.bootstrap.retries)
            .checked_mul(self.bootstrap.interval_secs)
            .unwrap_or(u64::MAX);
        bounded_wait("bootstrap.retries x bootstrap.intervalSecs", probe_budget)?;
        bounded_wait(
            "bootstrap.sshReadyTimeoutSecs",
            self.bootstrap.ssh_ready_timeout_secs,
        )?;
        bounded_wait("gitops.release.timeoutSecs", self.gitops.release.timeout_secs)?;
        if self.gitops.deployments.is_empty() {
            anyhow::bail!("gitops.deployments must declare at least one deployment");
        }
        let mut seen = std::collections::BTreeSet::new();
        for deployment in &self.gitops.deployments {
            if !seen.insert(deployment.name.as_str()) {
                anyhow::bail!("duplicate gitops deployment {}", deployment.name);
            }
        }
        Ok(())
    }

    /// Stable name of a cloud resource belonging to this deployment
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }
}

fn bounded_wait(field: &str, secs: u64) -> Result<()> {
    if secs > MAX_WAIT_SECS {
        anyhow::bail!(
            "{} is {}s, more than the {}s allowed for a single wait",
            field,
            secs,
            MAX_WAIT_SECS
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub cidr_block: String,
    pub subnet_cidr_block: String,
    pub availability_zone: Option<String>,
    pub ingress_ports: Vec<u16>,
    pub allowed_cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            cidr_block: "10.0.0.0/16".to_string(),
            subnet_cidr_block: "10.0.1.0/24".to_string(),
            availability_zone: None,
            ingress_ports: vec![22, 80, 443, 6443],
            allowed_cidr: "0.0.0.0/0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub image_id: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default)]
    pub k3s_version: Option<String>,
    #[serde(default = "default_k3s_channel")]
    pub k3s_channel: String,
}

fn default_instance_type() -> String {
    "t3.medium".to_string()
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_k3s_channel() -> String {
    "stable".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapConfig {
    pub kubeconfig_path: String,
    pub retries: u32,
    pub interval_secs: u64,
    pub loopback_endpoint: String,
    pub ssh_port: u16,
    pub ssh_ready_timeout_secs: u64,
    /// Continue with the artifact as fetched when the loopback endpoint is absent
    pub allow_unrewritten_kubeconfig: bool,
    /// Read the artifact through sudo
    pub privileged: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            kubeconfig_path: bootstrap::KUBECONFIG_PATH.to_string(),
            retries: bootstrap::PROBE_RETRIES,
            interval_secs: bootstrap::PROBE_INTERVAL_SECS,
            loopback_endpoint: bootstrap::LOOPBACK_ENDPOINT.to_string(),
            ssh_port: bootstrap::SSH_PORT,
            ssh_ready_timeout_secs: bootstrap::SSH_READY_TIMEOUT_SECS,
            allow_unrewritten_kubeconfig: false,
            privileged: true,
        }
    }
}

impl BootstrapConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsConfig {
    pub release: ReleaseConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub substitutions: SubstitutionConfig,
    pub deployments: Vec<DeploymentConfig>,
}

/// Helm release of the GitOps operator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    #[serde(default = "default_release_name")]
    pub name: String,
    #[serde(default = "default_release_chart")]
    pub chart: String,
    #[serde(default = "default_release_repository")]
    pub repository: String,
    pub version: String,
    #[serde(default = "default_operator_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub values: serde_json::Value,
    /// CRDs the release must have established before anything uses them
    #[serde(default = "default_release_crds")]
    pub crds: Vec<String>,
    #[serde(default = "default_release_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_release_name() -> String {
    "flux".to_string()
}

fn default_release_chart() -> String {
    "flux2".to_string()
}

fn default_release_repository() -> String {
    "https://fluxcd-community.github.io/helm-charts".to_string()
}

fn default_operator_namespace() -> String {
    "flux-system".to_string()
}

fn default_release_crds() -> Vec<String> {
    vec![
        "gitrepositories.source.toolkit.fluxcd.io".to_string(),
        "kustomizations.kustomize.toolkit.fluxcd.io".to_string(),
    ]
}

fn default_release_timeout_secs() -> u64 {
    600
}

/// Git repository the cluster pulls its desired state from
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Secret holding git credentials for private repositories
    #[serde(default)]
    pub secret_ref: Option<String>,
}

fn default_source_name() -> String {
    "platform".to_string()
}

fn default_interval() -> String {
    "1m0s".to_string()
}

/// Key-value map substituted into the synced manifests
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionConfig {
    #[serde(default = "default_substitutions_name")]
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        SubstitutionConfig {
            name: default_substitutions_name(),
            data: BTreeMap::new(),
        }
    }
}

fn default_substitutions_name() -> String {
    "cluster-vars".to_string()
}

/// One synced application
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub name: String,
    pub path: String,
    pub target_namespace: String,
    #[serde(default = "default_deployment_interval")]
    pub interval: String,
    #[serde(default = "default_true")]
    pub prune: bool,
    #[serde(default = "default_true")]
    pub wait: bool,
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_deployment_interval() -> String {
    "10m0s".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Container registry repository to ensure exists
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub refresh: Option<RefreshConfig>,
}

/// Scheduled registry pull credential refresh
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshConfig {
    /// Image that contains the kubeseed binary
    pub image: String,
    #[serde(default = "default_refresh_schedule")]
    pub schedule: String,
    #[serde(default = "default_operator_namespace")]
    pub namespace: String,
    /// Secret with AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY for the job
    #[serde(default = "default_aws_credentials_secret")]
    pub aws_credentials_secret: String,
}

fn default_refresh_schedule() -> String {
    refresh::DEFAULT_SCHEDULE.to_string()
}

fn default_aws_credentials_secret() -> String {
    "aws-credentials".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: demo
region: us-east-1
instance:
  imageId: ami-0123456789abcdef0
gitops:
  release:
    version: "2.14.1"
  source:
    url: https://github.com/example/platform
    branch: main
  deployments:
    - name: apps
      path: ./apps
      targetNamespace: apps
"#;

    #[test]
    fn test_minimal_spec_gets_defaults() {
        let spec = DeploymentSpec::from_yaml(MINIMAL).unwrap();

        assert_eq!(spec.instance.instance_type, "t3.medium");
        assert_eq!(spec.instance.ssh_user, "ubuntu");
        assert_eq!(spec.bootstrap.retries, 20);
        assert_eq!(spec.bootstrap.interval(), Duration::from_secs(5));
        assert_eq!(spec.bootstrap.loopback_endpoint, "https://127.0.0.1:6443");
        assert_eq!(spec.bootstrap.kubeconfig_path, "/etc/rancher/k3s/k3s.yaml");
        assert_eq!(spec.network.ingress_ports, vec![22, 80, 443, 6443]);
        assert_eq!(spec.gitops.release.namespace, "flux-system");
        assert_eq!(spec.gitops.release.crds.len(), 2);
        assert_eq!(spec.gitops.substitutions.name, "cluster-vars");
        assert!(spec.gitops.deployments[0].prune);
        assert!(spec.gitops.deployments[0].wait);
        assert!(spec.registry.refresh.is_none());
    }

    #[test]
    fn test_overrides_are_honoured() {
        let raw = format!(
            "{}\nbootstrap:\n  retries: 3\n  intervalSecs: 1\n  privileged: false\n",
            MINIMAL
        );
        let spec = DeploymentSpec::from_yaml(&raw).unwrap();

        assert_eq!(spec.bootstrap.retries, 3);
        assert_eq!(spec.bootstrap.interval_secs, 1);
        assert!(!spec.bootstrap.privileged);
        // Untouched fields keep their defaults
        assert_eq!(spec.bootstrap.ssh_port, 22);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let raw = format!("{}\nbootstrap:\n  retries: 0\n", MINIMAL);
        assert!(DeploymentSpec::from_yaml(&raw).is_err());
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let raw = format!(
            "{}\nbootstrap:\n  intervalSecs: 1000000000000000000\n",
            MINIMAL
        );
        let err = DeploymentSpec::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("bootstrap.intervalSecs"));
    }

    #[test]
    fn test_retry_budget_bounded_as_a_whole() {
        // Each field is modest, the product is not
        let raw = format!(
            "{}\nbootstrap:\n  retries: 1000\n  intervalSecs: 100\n",
            MINIMAL
        );
        assert!(DeploymentSpec::from_yaml(&raw).is_err());

        let raw = format!(
            "{}\nbootstrap:\n  retries: 60\n  intervalSecs: 60\n",
            MINIMAL
        );
        assert!(DeploymentSpec::from_yaml(&raw).is_ok());
    }

    #[test]
    fn test_oversized_timeouts_rejected() {
        let raw = format!(
            "{}\nbootstrap:\n  sshReadyTimeoutSecs: 18446744073709551615\n",
            MINIMAL
        );
        assert!(DeploymentSpec::from_yaml(&raw).is_err());

        let raw = MINIMAL.replace(
            "    version: \"2.14.1\"\n",
            "    version: \"2.14.1\"\n    timeoutSecs: 999999999\n",
        );
        let err = DeploymentSpec::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("gitops.release.timeoutSecs"));
    }

    #[test]
    fn test_duplicate_deployments_rejected() {
        let raw = MINIMAL.replace(
            "      targetNamespace: apps\n",
            "      targetNamespace: apps\n    - name: apps\n      path: ./other\n      targetNamespace: other\n",
        );
        assert!(DeploymentSpec::from_yaml(&raw).is_err());
    }

    #[test]
    fn test_resource_name_is_prefixed() {
        let spec = DeploymentSpec::from_yaml(MINIMAL).unwrap();
        assert_eq!(spec.resource_name("eip"), "demo-eip");
    }
}
