// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cloud provider boundary.
//!
//! Every operation is keyed by a stable logical name so re-running a
//! deployment converges on the same resources instead of duplicating them.

pub mod aws;
pub mod memory;

pub use aws::Ec2Provider;
pub use memory::InMemoryProvider;

use crate::error::Result;
use async_trait::async_trait;
use std::net::IpAddr;

/// Desired network layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr_block: String,
    pub subnet_cidr_block: String,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub subnet_id: String,
}

/// Desired firewall rules: TCP ingress on each port from `allowed_cidr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallSpec {
    pub name: String,
    pub ingress_ports: Vec<u16>,
    pub allowed_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub boot_script: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopped,
    Terminated,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeInstance {
    pub id: String,
    pub state: InstanceState,
    /// Ephemeral public address assigned by the provider, if any
    pub public_address: Option<IpAddr>,
}

/// A provider-allocated address that outlives any single instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress {
    pub allocation_id: String,
    pub ip: IpAddr,
    /// Instance currently associated with the address
    pub instance_id: Option<String>,
    pub association_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRepository {
    pub name: String,
    pub uri: String,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn ensure_network(&self, spec: &NetworkSpec) -> Result<Network>;

    async fn ensure_security_group(
        &self,
        network: &Network,
        spec: &FirewallSpec,
    ) -> Result<SecurityGroup>;

    /// Register `public_key` under `name`, replacing any existing key of that name
    async fn import_key_pair(&self, name: &str, public_key: &str) -> Result<()>;

    /// Return the live instance called `spec.name`, launching one if none exists
    async fn ensure_instance(&self, spec: &InstanceSpec) -> Result<ComputeInstance>;

    async fn describe_instance(&self, instance_id: &str) -> Result<ComputeInstance>;

    /// Return the address called `name`, allocating one if none exists
    async fn ensure_address(&self, name: &str) -> Result<StaticAddress>;

    /// Point the address at `instance_id`, taking it away from any previous holder
    async fn associate_address(
        &self,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<StaticAddress>;

    async fn describe_address(&self, allocation_id: &str) -> Result<StaticAddress>;

    async fn ensure_registry_repository(&self, name: &str) -> Result<RegistryRepository>;

    async fn find_instance(&self, name: &str) -> Result<Option<ComputeInstance>>;
    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
    async fn find_address(&self, name: &str) -> Result<Option<StaticAddress>>;
    async fn release_address(&self, address: &StaticAddress) -> Result<()>;
    async fn delete_key_pair(&self, name: &str) -> Result<()>;
    async fn delete_security_group(&self, name: &str) -> Result<()>;
    async fn delete_network(&self, name: &str) -> Result<()>;
}
