// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! End-to-end bootstrap run.
//!
//! A deployment goes through key generation, provisioning, the remote wait for
//! the kubeconfig, the endpoint rewrite, and finally the dependency-ordered
//! apply of the GitOps resources. Any failure aborts the run; re-running
//! converges on the resources that already exist.

use crate::addons::HelmInstaller;
use crate::config::{BootstrapConfig, DeploymentSpec};
use crate::credentials::{endpoint_for_address, rewrite, KeyPair};
use crate::error::{Result, SeedError};
use crate::gitops::{build_plan, execute};
use crate::kubernetes::client_from_kubeconfig;
use crate::outputs::{DeploymentOutputs, KUBECONFIG_FILE, OUTPUTS_FILE, PRIVATE_KEY_FILE};
use crate::poll::Backoff;
use crate::provision::Provisioner;
use crate::registry::{ApplyBackend, KubeBackend, ResourceRegistry};
use crate::remote::{wait_for_port, BootstrapPoller, BootstrapProbe, RemoteExecutor, RemoteTarget};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Turns a rewritten kubeconfig into something resources can be applied through
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &SecretString) -> Result<Arc<dyn ApplyBackend>>;
}

/// Connects to the live API server and installs releases with helm
pub struct KubeConnector {
    helm: HelmInstaller,
}

impl KubeConnector {
    pub fn new(helm: HelmInstaller) -> Self {
        KubeConnector { helm }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &SecretString) -> Result<Arc<dyn ApplyBackend>> {
        let client = client_from_kubeconfig(kubeconfig.expose_secret()).await?;
        Ok(Arc::new(KubeBackend::new(
            client,
            self.helm.clone(),
            kubeconfig.clone(),
        )))
    }
}

/// Point `artifact` at `address` instead of the loopback endpoint.
///
/// An artifact without the loopback endpoint is refused unless the bootstrap
/// config explicitly allows using it as fetched.
pub fn rewrite_kubeconfig(
    artifact: &SecretString,
    bootstrap: &BootstrapConfig,
    address: IpAddr,
) -> Result<SecretString> {
    let endpoint = endpoint_for_address(&bootstrap.loopback_endpoint, address)?;
    let rewritten = rewrite(
        artifact.expose_secret(),
        &bootstrap.loopback_endpoint,
        &endpoint,
    );

    if rewritten.is_noop() {
        if !bootstrap.allow_unrewritten_kubeconfig {
            return Err(SeedError::EndpointNotRewritten {
                endpoint: bootstrap.loopback_endpoint.clone(),
            });
        }
        warn!(
            "Kubeconfig does not mention {}, using it unmodified",
            bootstrap.loopback_endpoint
        );
    } else {
        info!(
            "Rewrote {} occurrence(s) of {} to {}",
            rewritten.replacements, bootstrap.loopback_endpoint, endpoint
        );
    }

    Ok(SecretString::from(rewritten.text))
}

/// Outcome of a successful deployment
#[derive(Debug)]
pub struct DeployReport {
    pub public_address: IpAddr,
    pub instance_id: String,
    /// Plan nodes in the order their layers were acknowledged
    pub applied: Vec<String>,
    pub outputs_file: PathBuf,
}

pub struct Deployer {
    provisioner: Provisioner,
    executor: Arc<dyn RemoteExecutor>,
    connector: Arc<dyn ClusterConnector>,
    output_dir: PathBuf,
    wait_for_ssh: bool,
}

impl Deployer {
    pub fn new(
        provisioner: Provisioner,
        executor: Arc<dyn RemoteExecutor>,
        connector: Arc<dyn ClusterConnector>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Deployer {
            provisioner,
            executor,
            connector,
            output_dir: output_dir.into(),
            wait_for_ssh: true,
        }
    }

    /// Go straight to the remote channel without first waiting for the SSH port
    pub fn skip_port_wait(mut self) -> Self {
        self.wait_for_ssh = false;
        self
    }

    fn key_path(&self) -> PathBuf {
        self.output_dir.join(PRIVATE_KEY_FILE)
    }

    #[instrument(skip(self, spec, cancel), fields(deployment = %spec.name))]
    pub async fn deploy(
        &self,
        spec: &DeploymentSpec,
        cancel: &CancellationToken,
    ) -> Result<DeployReport> {
        // Graph errors must surface before anything is created
        let plan = build_plan(spec)?;

        let key_path = self.key_path();
        if !key_path.exists() {
            // A running instance only accepts the key it was launched with
            if let Some(instance) = self.provisioner.existing_instance(spec).await? {
                return Err(SeedError::KeyPair(format!(
                    "instance {} was launched with a key that is no longer at {}; \
                     restore that file or run destroy before deploying again",
                    instance.id,
                    key_path.display()
                )));
            }
        }
        let key = KeyPair::load_or_generate(&key_path, &format!("kubeseed@{}", spec.name))?;
        let host = self.provisioner.provision(spec, &key).await?;
        let address = host.address.ip;
        info!("Instance {} reachable at {}", host.instance.id, address);

        let bootstrap = &spec.bootstrap;
        if self.wait_for_ssh {
            wait_for_port(
                SocketAddr::new(address, bootstrap.ssh_port),
                Backoff::with_timeout(Duration::from_secs(bootstrap.ssh_ready_timeout_secs)),
            )
            .await?;
        }

        let target = RemoteTarget {
            host: address.to_string(),
            port: bootstrap.ssh_port,
            user: spec.instance.ssh_user.clone(),
            private_key: key.private_openssh().clone(),
        };
        let poller = BootstrapPoller::new(
            self.executor.clone(),
            BootstrapProbe::from_config(bootstrap),
        );
        let artifact = poller.fetch(&target, cancel).await?;
        let kubeconfig = rewrite_kubeconfig(&artifact, bootstrap, address)?;

        let backend = self.connector.connect(&kubeconfig).await?;
        let registry = ResourceRegistry::new(backend);
        let applied = execute(&plan, &registry).await?;

        let outputs = DeploymentOutputs {
            deployment: spec.name.clone(),
            public_address: address,
            instance_id: host.instance.id.clone(),
            private_key: key.private_openssh().clone(),
            kubeconfig,
        };
        let outputs_file = outputs.write_to(&self.output_dir)?;

        info!("Deployment {} complete", spec.name);
        Ok(DeployReport {
            public_address: address,
            instance_id: host.instance.id,
            applied,
            outputs_file,
        })
    }

    /// Tear down the cloud resources and forget the persisted credentials
    #[instrument(skip(self, spec), fields(deployment = %spec.name))]
    pub async fn destroy(&self, spec: &DeploymentSpec) -> Result<()> {
        self.provisioner.teardown(spec).await?;

        for file in [PRIVATE_KEY_FILE, KUBECONFIG_FILE, OUTPUTS_FILE] {
            remove_if_present(&self.output_dir.join(file))?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
