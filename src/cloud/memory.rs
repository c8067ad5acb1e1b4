// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-process provider with the same naming and association rules as the real one.
//!
//! Instances start out `Pending` and report `Running` from their second
//! describe onward. Addresses are handed out from 203.0.113.0/24 starting at .10.

use super::{
    CloudProvider, ComputeInstance, FirewallSpec, InstanceSpec, InstanceState, Network,
    NetworkSpec, RegistryRepository, SecurityGroup, StaticAddress,
};
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct InstanceRecord {
    name: String,
    spec: InstanceSpec,
    state: InstanceState,
    describes: u32,
    public_address: IpAddr,
}

#[derive(Debug, Default)]
struct State {
    counter: u32,
    networks: BTreeMap<String, Network>,
    security_groups: BTreeMap<String, (SecurityGroup, FirewallSpec)>,
    key_pairs: BTreeMap<String, String>,
    instances: BTreeMap<String, InstanceRecord>,
    addresses: BTreeMap<String, StaticAddress>,
    repositories: BTreeMap<String, RegistryRepository>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}-{:08x}", prefix, self.counter)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boot script an instance was launched with
    pub fn boot_script(&self, instance_id: &str) -> Option<String> {
        self.lock()
            .ok()?
            .instances
            .get(instance_id)
            .map(|i| i.spec.boot_script.clone())
    }

    /// Public key registered under `name`
    pub fn key_pair(&self, name: &str) -> Option<String> {
        self.lock().ok()?.key_pairs.get(name).cloned()
    }

    /// Rules registered for the security group called `name`
    pub fn firewall(&self, name: &str) -> Option<FirewallSpec> {
        self.lock()
            .ok()?
            .security_groups
            .get(name)
            .map(|(_, spec)| spec.clone())
    }

    /// Number of instances in any state other than terminated
    pub fn live_instances(&self) -> usize {
        self.lock()
            .map(|s| {
                s.instances
                    .values()
                    .filter(|i| i.state != InstanceState::Terminated)
                    .count()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| SeedError::provisioning("lock", "provider state poisoned"))
    }
}

fn to_instance(id: &str, record: &InstanceRecord) -> ComputeInstance {
    ComputeInstance {
        id: id.to_string(),
        state: record.state.clone(),
        public_address: Some(record.public_address),
    }
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    async fn ensure_network(&self, spec: &NetworkSpec) -> Result<Network> {
        let mut state = self.lock()?;
        if let Some(network) = state.networks.get(&spec.name) {
            return Ok(network.clone());
        }
        let network = Network {
            id: state.next_id("vpc"),
            subnet_id: state.next_id("subnet"),
        };
        state.networks.insert(spec.name.clone(), network.clone());
        Ok(network)
    }

    async fn ensure_security_group(
        &self,
        network: &Network,
        spec: &FirewallSpec,
    ) -> Result<SecurityGroup> {
        let mut state = self.lock()?;
        if !state.networks.values().any(|n| n.id == network.id) {
            return Err(SeedError::provisioning(
                "ensure_security_group",
                format!("network {} does not exist", network.id),
            ));
        }
        let group = match state.security_groups.get(&spec.name) {
            Some((group, _)) => group.clone(),
            None => SecurityGroup {
                id: state.next_id("sg"),
            },
        };
        state
            .security_groups
            .insert(spec.name.clone(), (group.clone(), spec.clone()));
        Ok(group)
    }

    async fn import_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        self.lock()?
            .key_pairs
            .insert(name.to_string(), public_key.to_string());
        Ok(())
    }

    async fn ensure_instance(&self, spec: &InstanceSpec) -> Result<ComputeInstance> {
        let mut state = self.lock()?;
        if !state.key_pairs.contains_key(&spec.key_name) {
            return Err(SeedError::provisioning(
                "ensure_instance",
                format!("key pair {} is not registered", spec.key_name),
            ));
        }
        if let Some((id, record)) = state.instances.iter().find(|(_, r)| {
            r.name == spec.name
                && matches!(r.state, InstanceState::Pending | InstanceState::Running)
        }) {
            return Ok(to_instance(id, record));
        }

        let id = state.next_id("i");
        let octet = (state.counter % 200) as u8 + 20;
        let record = InstanceRecord {
            name: spec.name.clone(),
            spec: spec.clone(),
            state: InstanceState::Pending,
            describes: 0,
            public_address: IpAddr::V4(Ipv4Addr::new(198, 51, 100, octet)),
        };
        let instance = to_instance(&id, &record);
        state.instances.insert(id, record);
        Ok(instance)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<ComputeInstance> {
        let mut state = self.lock()?;
        let record = state.instances.get_mut(instance_id).ok_or_else(|| {
            SeedError::provisioning(
                "describe_instance",
                format!("instance {} not found", instance_id),
            )
        })?;
        record.describes += 1;
        if record.state == InstanceState::Pending && record.describes > 1 {
            record.state = InstanceState::Running;
        }
        Ok(to_instance(instance_id, record))
    }

    async fn ensure_address(&self, name: &str) -> Result<StaticAddress> {
        let mut state = self.lock()?;
        if let Some(address) = state.addresses.get(name) {
            return Ok(address.clone());
        }
        let octet = 10 + state.addresses.len() as u8;
        let address = StaticAddress {
            allocation_id: state.next_id("eipalloc"),
            ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, octet)),
            instance_id: None,
            association_id: None,
        };
        state.addresses.insert(name.to_string(), address.clone());
        Ok(address)
    }

    async fn associate_address(
        &self,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<StaticAddress> {
        let mut state = self.lock()?;
        if !state.instances.contains_key(instance_id) {
            return Err(SeedError::provisioning(
                "associate_address",
                format!("instance {} not found", instance_id),
            ));
        }
        let association_id = state.next_id("eipassoc");
        let address = state
            .addresses
            .values_mut()
            .find(|a| a.allocation_id == allocation_id)
            .ok_or_else(|| {
                SeedError::provisioning(
                    "associate_address",
                    format!("address {} not found", allocation_id),
                )
            })?;
        // A single slot: the new association replaces the old one
        address.instance_id = Some(instance_id.to_string());
        address.association_id = Some(association_id);
        Ok(address.clone())
    }

    async fn describe_address(&self, allocation_id: &str) -> Result<StaticAddress> {
        self.lock()?
            .addresses
            .values()
            .find(|a| a.allocation_id == allocation_id)
            .cloned()
            .ok_or_else(|| {
                SeedError::provisioning(
                    "describe_address",
                    format!("address {} not found", allocation_id),
                )
            })
    }

    async fn ensure_registry_repository(&self, name: &str) -> Result<RegistryRepository> {
        let mut state = self.lock()?;
        let repository = state
            .repositories
            .entry(name.to_string())
            .or_insert_with(|| RegistryRepository {
                name: name.to_string(),
                uri: format!("123456789012.dkr.ecr.local.amazonaws.com/{}", name),
            });
        Ok(repository.clone())
    }

    async fn find_instance(&self, name: &str) -> Result<Option<ComputeInstance>> {
        Ok(self
            .lock()?
            .instances
            .iter()
            .find(|(_, r)| r.name == name && r.state != InstanceState::Terminated)
            .map(|(id, r)| to_instance(id, r)))
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(record) = state.instances.get_mut(instance_id) {
            record.state = InstanceState::Terminated;
        }
        for address in state.addresses.values_mut() {
            if address.instance_id.as_deref() == Some(instance_id) {
                address.instance_id = None;
                address.association_id = None;
            }
        }
        Ok(())
    }

    async fn find_address(&self, name: &str) -> Result<Option<StaticAddress>> {
        Ok(self.lock()?.addresses.get(name).cloned())
    }

    async fn release_address(&self, address: &StaticAddress) -> Result<()> {
        self.lock()?
            .addresses
            .retain(|_, a| a.allocation_id != address.allocation_id);
        Ok(())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.lock()?.key_pairs.remove(name);
        Ok(())
    }

    async fn delete_security_group(&self, name: &str) -> Result<()> {
        self.lock()?.security_groups.remove(name);
        Ok(())
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        self.lock()?.networks.remove(name);
        Ok(())
    }
}
