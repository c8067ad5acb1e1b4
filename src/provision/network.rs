// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::cloud::{
    CloudProvider, ComputeInstance, FirewallSpec, InstanceSpec, InstanceState, NetworkSpec,
    RegistryRepository, StaticAddress,
};
use crate::config::DeploymentSpec;
use crate::constants::poll::INSTANCE_RUNNING_TIMEOUT_SECS;
use crate::credentials::KeyPair;
use crate::error::{Result, SeedError};
use crate::poll::{wait_until, Backoff};
use crate::provision::address::AddressBinder;
use crate::provision::boot_script::BootScript;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// What the provisioner produced for one deployment
#[derive(Debug, Clone)]
pub struct ProvisionedHost {
    pub instance: ComputeInstance,
    /// Static address, associated with `instance`
    pub address: StaticAddress,
    pub registry: Option<RegistryRepository>,
}

/// Declares the network, firewall, key and compute instance of a deployment
pub struct Provisioner {
    provider: Arc<dyn CloudProvider>,
    binder: AddressBinder,
    running_backoff: Backoff,
}

impl Provisioner {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Provisioner {
            binder: AddressBinder::new(provider.clone()),
            provider,
            running_backoff: Backoff::with_timeout(Duration::from_secs(
                INSTANCE_RUNNING_TIMEOUT_SECS,
            )),
        }
    }

    pub fn with_running_backoff(mut self, backoff: Backoff) -> Self {
        self.running_backoff = backoff;
        self
    }

    /// Ensure every cloud resource exists and the instance is running behind the static address.
    ///
    /// The address is allocated before the instance so the boot script can
    /// put it into the API server certificate.
    #[instrument(skip(self, spec, key), fields(deployment = %spec.name))]
    pub async fn provision(&self, spec: &DeploymentSpec, key: &KeyPair) -> Result<ProvisionedHost> {
        let network = self
            .provider
            .ensure_network(&NetworkSpec {
                name: spec.resource_name("vpc"),
                cidr_block: spec.network.cidr_block.clone(),
                subnet_cidr_block: spec.network.subnet_cidr_block.clone(),
                availability_zone: spec.network.availability_zone.clone(),
            })
            .await?;
        info!("Network {} ready", network.id);

        let group = self
            .provider
            .ensure_security_group(
                &network,
                &FirewallSpec {
                    name: spec.resource_name("sg"),
                    ingress_ports: spec.network.ingress_ports.clone(),
                    allowed_cidr: spec.network.allowed_cidr.clone(),
                },
            )
            .await?;

        let key_name = spec.resource_name("key");
        self.provider
            .import_key_pair(&key_name, key.public_openssh())
            .await?;
        info!("Registered key {} ({})", key_name, key.fingerprint());

        let address = self.binder.allocate(&spec.resource_name("eip")).await?;

        let boot_script = BootScript {
            tls_san: address.ip,
            k3s_version: spec.instance.k3s_version.clone(),
            k3s_channel: spec.instance.k3s_channel.clone(),
        };
        let launched = self
            .provider
            .ensure_instance(&InstanceSpec {
                name: spec.name.clone(),
                image_id: spec.instance.image_id.clone(),
                instance_type: spec.instance.instance_type.clone(),
                key_name,
                subnet_id: network.subnet_id.clone(),
                security_group_id: group.id.clone(),
                boot_script: boot_script.render(),
            })
            .await?;

        let instance = self.wait_until_running(&launched.id).await?;
        let address = self.binder.associate(&address, &instance.id).await?;

        let registry = match &spec.registry.repository {
            Some(name) => Some(self.provider.ensure_registry_repository(name).await?),
            None => None,
        };

        Ok(ProvisionedHost {
            instance,
            address,
            registry,
        })
    }

    #[instrument(skip(self))]
    async fn wait_until_running(&self, instance_id: &str) -> Result<ComputeInstance> {
        let what = format!("instance {} to run", instance_id);
        let instance = wait_until(&what, self.running_backoff, || async {
            let instance = self.provider.describe_instance(instance_id).await?;
            Ok(match instance.state {
                InstanceState::Pending => None,
                _ => Some(instance),
            })
        })
        .await?;

        match instance.state {
            InstanceState::Running => {
                info!("Instance {} is running", instance.id);
                Ok(instance)
            }
            other => Err(SeedError::provisioning(
                "wait_until_running",
                format!("instance {} entered state {:?}", instance.id, other),
            )),
        }
    }

    /// Instance a previous run left behind, if it has not been terminated
    pub async fn existing_instance(
        &self,
        spec: &DeploymentSpec,
    ) -> Result<Option<ComputeInstance>> {
        self.provider.find_instance(&spec.name).await
    }

    /// Delete everything [`Provisioner::provision`] created, tolerating resources already gone
    #[instrument(skip(self, spec), fields(deployment = %spec.name))]
    pub async fn teardown(&self, spec: &DeploymentSpec) -> Result<()> {
        match self.provider.find_instance(&spec.name).await? {
            Some(instance) => self.provider.terminate_instance(&instance.id).await?,
            None => warn!("No instance named {}", spec.name),
        }

        match self.provider.find_address(&spec.resource_name("eip")).await? {
            Some(address) => self.provider.release_address(&address).await?,
            None => warn!("No static address for {}", spec.name),
        }

        self.provider
            .delete_key_pair(&spec.resource_name("key"))
            .await?;
        self.provider
            .delete_security_group(&spec.resource_name("sg"))
            .await?;
        self.provider
            .delete_network(&spec.resource_name("vpc"))
            .await?;

        info!("Deployment {} torn down", spec.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryProvider;
    use crate::test_utils::deployment_spec;

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_provision_binds_address_and_embeds_tls_san() {
        let provider = Arc::new(InMemoryProvider::new());
        let provisioner = Provisioner::new(provider.clone()).with_running_backoff(fast());
        let spec = deployment_spec();
        let key = KeyPair::generate("kubeseed@demo").unwrap();

        let host = provisioner.provision(&spec, &key).await.unwrap();

        assert_eq!(host.instance.state, InstanceState::Running);
        assert_eq!(host.address.ip.to_string(), "203.0.113.10");
        assert_eq!(host.address.instance_id.as_deref(), Some(host.instance.id.as_str()));

        let script = provider.boot_script(&host.instance.id).unwrap();
        assert!(script.contains("--tls-san 203.0.113.10"));
        assert_eq!(
            provider.key_pair("demo-key").as_deref(),
            Some(key.public_openssh())
        );
        assert_eq!(
            provider.firewall("demo-sg").unwrap().ingress_ports,
            vec![22, 80, 443, 6443]
        );
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let provider = Arc::new(InMemoryProvider::new());
        let provisioner = Provisioner::new(provider.clone()).with_running_backoff(fast());
        let spec = deployment_spec();
        let key = KeyPair::generate("kubeseed@demo").unwrap();

        let first = provisioner.provision(&spec, &key).await.unwrap();
        let second = provisioner.provision(&spec, &key).await.unwrap();

        assert_eq!(first.instance.id, second.instance.id);
        assert_eq!(first.address.allocation_id, second.address.allocation_id);
        assert_eq!(provider.live_instances(), 1);
    }

    #[tokio::test]
    async fn test_provision_ensures_registry_when_configured() {
        let provider = Arc::new(InMemoryProvider::new());
        let provisioner = Provisioner::new(provider.clone()).with_running_backoff(fast());
        let mut spec = deployment_spec();
        spec.registry.repository = Some("demo-apps".to_string());
        let key = KeyPair::generate("kubeseed@demo").unwrap();

        let host = provisioner.provision(&spec, &key).await.unwrap();

        assert!(host.registry.unwrap().uri.ends_with("/demo-apps"));
    }

    #[tokio::test]
    async fn test_teardown_removes_resources_and_tolerates_repeat() {
        let provider = Arc::new(InMemoryProvider::new());
        let provisioner = Provisioner::new(provider.clone()).with_running_backoff(fast());
        let spec = deployment_spec();
        let key = KeyPair::generate("kubeseed@demo").unwrap();
        provisioner.provision(&spec, &key).await.unwrap();

        provisioner.teardown(&spec).await.unwrap();
        assert_eq!(provider.live_instances(), 0);
        assert!(provider.key_pair("demo-key").is_none());
        assert!(provider.firewall("demo-sg").is_none());
        assert!(provider.find_address("demo-eip").await.unwrap().is_none());

        provisioner.teardown(&spec).await.unwrap();
    }
}
