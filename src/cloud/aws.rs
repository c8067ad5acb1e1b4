// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! EC2 and ECR backed provider.
//!
//! Resources are found again through their `Name` tag, which makes every
//! `ensure_*` call safe to repeat.

use super::{
    CloudProvider, ComputeInstance, FirewallSpec, InstanceSpec, InstanceState, Network,
    NetworkSpec, RegistryRepository, SecurityGroup, StaticAddress,
};
use crate::constants::labels::{DEPLOYMENT, NAME_TAG};
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_ec2::primitives::Blob;
use aws_sdk_ec2::types::{
    Address, AttributeBooleanValue, DomainType, Filter, Instance, InstanceStateName, InstanceType,
    IpPermission, IpRange, ResourceType, Tag, TagSpecification,
};
use aws_sdk_ecr::types::{ImageScanningConfiguration, ImageTagMutability};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};

pub struct Ec2Provider {
    ec2: aws_sdk_ec2::Client,
    ecr: aws_sdk_ecr::Client,
    deployment: String,
}

impl Ec2Provider {
    /// Create a provider for `region` using the default credential chain
    pub async fn new(region: &str, deployment: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Ec2Provider {
            ec2: aws_sdk_ec2::Client::new(&config),
            ecr: aws_sdk_ecr::Client::new(&config),
            deployment: deployment.to_string(),
        }
    }

    fn tags(&self, resource_type: ResourceType, name: &str) -> TagSpecification {
        TagSpecification::builder()
            .resource_type(resource_type)
            .tags(Tag::builder().key(NAME_TAG).value(name).build())
            .tags(Tag::builder().key(DEPLOYMENT).value(&self.deployment).build())
            .build()
    }

    async fn find_vpc(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .ec2
            .describe_vpcs()
            .filters(name_filter(name))
            .send()
            .await
            .map_err(aws_error("describe_vpcs"))?;

        Ok(output
            .vpcs()
            .first()
            .and_then(|v| v.vpc_id())
            .map(str::to_string))
    }

    async fn find_subnet(&self, vpc_id: &str) -> Result<Option<String>> {
        let output = self
            .ec2
            .describe_subnets()
            .filters(filter("vpc-id", vpc_id))
            .send()
            .await
            .map_err(aws_error("describe_subnets"))?;

        Ok(output
            .subnets()
            .first()
            .and_then(|s| s.subnet_id())
            .map(str::to_string))
    }

    async fn find_internet_gateway(&self, vpc_id: &str) -> Result<Option<String>> {
        let output = self
            .ec2
            .describe_internet_gateways()
            .filters(filter("attachment.vpc-id", vpc_id))
            .send()
            .await
            .map_err(aws_error("describe_internet_gateways"))?;

        Ok(output
            .internet_gateways()
            .first()
            .and_then(|g| g.internet_gateway_id())
            .map(str::to_string))
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .ec2
            .describe_security_groups()
            .filters(filter("group-name", name))
            .send()
            .await
            .map_err(aws_error("describe_security_groups"))?;

        Ok(output
            .security_groups()
            .first()
            .and_then(|g| g.group_id())
            .map(str::to_string))
    }

    /// Create the internet gateway and the default route of the main route table
    async fn attach_internet_access(&self, name: &str, vpc_id: &str) -> Result<()> {
        if self.find_internet_gateway(vpc_id).await?.is_some() {
            return Ok(());
        }

        let gateway = self
            .ec2
            .create_internet_gateway()
            .tag_specifications(self.tags(ResourceType::InternetGateway, name))
            .send()
            .await
            .map_err(aws_error("create_internet_gateway"))?;
        let gateway_id = gateway
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .ok_or_else(|| missing("create_internet_gateway", "internet gateway id"))?;

        self.ec2
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(aws_error("attach_internet_gateway"))?;

        let tables = self
            .ec2
            .describe_route_tables()
            .filters(filter("vpc-id", vpc_id))
            .filters(filter("association.main", "true"))
            .send()
            .await
            .map_err(aws_error("describe_route_tables"))?;
        let route_table_id = tables
            .route_tables()
            .first()
            .and_then(|t| t.route_table_id())
            .ok_or_else(|| missing("describe_route_tables", "main route table"))?;

        self.ec2
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block("0.0.0.0/0")
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(aws_error("create_route"))?;

        info!(vpc = %vpc_id, gateway = %gateway_id, "Internet gateway attached");
        Ok(())
    }

    async fn wait_for_termination(&self, instance_id: &str) -> Result<()> {
        use crate::constants::poll::INSTANCE_RUNNING_TIMEOUT_SECS;
        use crate::poll::{wait_until, Backoff};
        use std::time::Duration;

        wait_until(
            &format!("instance {} to terminate", instance_id),
            Backoff::with_timeout(Duration::from_secs(INSTANCE_RUNNING_TIMEOUT_SECS)),
            || async {
                let instance = self.describe_instance(instance_id).await?;
                Ok((instance.state == InstanceState::Terminated).then_some(()))
            },
        )
        .await
    }
}

fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

fn name_filter(name: &str) -> Filter {
    filter(&format!("tag:{}", NAME_TAG), name)
}

fn aws_error<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> SeedError {
    move |e| SeedError::provisioning(operation, DisplayErrorContext(&e))
}

fn missing(operation: &str, what: &str) -> SeedError {
    SeedError::provisioning(operation, format!("response did not include {}", what))
}

fn is_not_found<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.code().is_some_and(|c| c.ends_with(".NotFound"))
}

fn to_compute_instance(instance: &Instance) -> Result<ComputeInstance> {
    let id = instance
        .instance_id()
        .ok_or_else(|| missing("describe_instances", "instance id"))?;

    let state = match instance.state().and_then(|s| s.name()) {
        Some(InstanceStateName::Pending) => InstanceState::Pending,
        Some(InstanceStateName::Running) => InstanceState::Running,
        Some(InstanceStateName::Stopped) => InstanceState::Stopped,
        Some(InstanceStateName::Terminated) => InstanceState::Terminated,
        Some(other) => InstanceState::Other(other.as_str().to_string()),
        None => InstanceState::Other("unknown".to_string()),
    };

    Ok(ComputeInstance {
        id: id.to_string(),
        state,
        public_address: instance
            .public_ip_address()
            .and_then(|ip| ip.parse::<IpAddr>().ok()),
    })
}

fn to_static_address(address: &Address) -> Result<StaticAddress> {
    let allocation_id = address
        .allocation_id()
        .ok_or_else(|| missing("describe_addresses", "allocation id"))?;
    let ip = address
        .public_ip()
        .ok_or_else(|| missing("describe_addresses", "public ip"))?
        .parse::<IpAddr>()
        .map_err(|e| SeedError::provisioning("describe_addresses", e))?;

    Ok(StaticAddress {
        allocation_id: allocation_id.to_string(),
        ip,
        instance_id: address.instance_id().map(str::to_string),
        association_id: address.association_id().map(str::to_string),
    })
}

#[async_trait]
impl CloudProvider for Ec2Provider {
    #[instrument(skip(self, spec), fields(network = %spec.name))]
    async fn ensure_network(&self, spec: &NetworkSpec) -> Result<Network> {
        let vpc_id = match self.find_vpc(&spec.name).await? {
            Some(id) => {
                debug!("VPC {} already exists", id);
                id
            }
            None => {
                let output = self
                    .ec2
                    .create_vpc()
                    .cidr_block(&spec.cidr_block)
                    .tag_specifications(self.tags(ResourceType::Vpc, &spec.name))
                    .send()
                    .await
                    .map_err(aws_error("create_vpc"))?;
                let id = output
                    .vpc()
                    .and_then(|v| v.vpc_id())
                    .ok_or_else(|| missing("create_vpc", "vpc id"))?
                    .to_string();

                self.ec2
                    .modify_vpc_attribute()
                    .vpc_id(&id)
                    .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
                    .send()
                    .await
                    .map_err(aws_error("modify_vpc_attribute"))?;

                info!("Created VPC {}", id);
                id
            }
        };

        let subnet_id = match self.find_subnet(&vpc_id).await? {
            Some(id) => id,
            None => {
                let output = self
                    .ec2
                    .create_subnet()
                    .vpc_id(&vpc_id)
                    .cidr_block(&spec.subnet_cidr_block)
                    .set_availability_zone(spec.availability_zone.clone())
                    .tag_specifications(self.tags(ResourceType::Subnet, &spec.name))
                    .send()
                    .await
                    .map_err(aws_error("create_subnet"))?;
                let id = output
                    .subnet()
                    .and_then(|s| s.subnet_id())
                    .ok_or_else(|| missing("create_subnet", "subnet id"))?
                    .to_string();

                self.ec2
                    .modify_subnet_attribute()
                    .subnet_id(&id)
                    .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
                    .send()
                    .await
                    .map_err(aws_error("modify_subnet_attribute"))?;

                info!("Created subnet {}", id);
                id
            }
        };

        self.attach_internet_access(&spec.name, &vpc_id).await?;

        Ok(Network {
            id: vpc_id,
            subnet_id,
        })
    }

    #[instrument(skip(self, network, spec), fields(group = %spec.name))]
    async fn ensure_security_group(
        &self,
        network: &Network,
        spec: &FirewallSpec,
    ) -> Result<SecurityGroup> {
        let group_id = match self.find_security_group(&spec.name).await? {
            Some(id) => id,
            None => {
                let output = self
                    .ec2
                    .create_security_group()
                    .group_name(&spec.name)
                    .description(format!("kubeseed control plane {}", self.deployment))
                    .vpc_id(&network.id)
                    .tag_specifications(self.tags(ResourceType::SecurityGroup, &spec.name))
                    .send()
                    .await
                    .map_err(aws_error("create_security_group"))?;
                output
                    .group_id()
                    .ok_or_else(|| missing("create_security_group", "group id"))?
                    .to_string()
            }
        };

        for port in &spec.ingress_ports {
            let permission = IpPermission::builder()
                .ip_protocol("tcp")
                .from_port(i32::from(*port))
                .to_port(i32::from(*port))
                .ip_ranges(IpRange::builder().cidr_ip(&spec.allowed_cidr).build())
                .build();

            match self
                .ec2
                .authorize_security_group_ingress()
                .group_id(&group_id)
                .ip_permissions(permission)
                .send()
                .await
            {
                Ok(_) => debug!("Opened tcp/{} on {}", port, group_id),
                Err(e) if e.code() == Some("InvalidPermission.Duplicate") => {
                    debug!("Rule tcp/{} already present on {}", port, group_id)
                }
                Err(e) => return Err(aws_error("authorize_security_group_ingress")(e)),
            }
        }

        Ok(SecurityGroup { id: group_id })
    }

    #[instrument(skip(self, public_key))]
    async fn import_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        // Deleting a missing key pair succeeds, so this is a plain replace
        self.delete_key_pair(name).await?;

        self.ec2
            .import_key_pair()
            .key_name(name)
            .public_key_material(Blob::new(public_key.as_bytes()))
            .tag_specifications(self.tags(ResourceType::KeyPair, name))
            .send()
            .await
            .map_err(aws_error("import_key_pair"))?;

        info!("Imported key pair {}", name);
        Ok(())
    }

    #[instrument(skip(self, spec), fields(instance = %spec.name))]
    async fn ensure_instance(&self, spec: &InstanceSpec) -> Result<ComputeInstance> {
        if let Some(existing) = self.find_instance(&spec.name).await? {
            info!("Instance {} already exists", existing.id);
            return Ok(existing);
        }

        let output = self
            .ec2
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .key_name(&spec.key_name)
            .subnet_id(&spec.subnet_id)
            .security_group_ids(&spec.security_group_id)
            .user_data(STANDARD.encode(spec.boot_script.as_bytes()))
            .min_count(1)
            .max_count(1)
            .tag_specifications(self.tags(ResourceType::Instance, &spec.name))
            .send()
            .await
            .map_err(aws_error("run_instances"))?;

        let instance = output
            .instances()
            .first()
            .ok_or_else(|| missing("run_instances", "instance"))?;
        let instance = to_compute_instance(instance)?;

        info!("Launched instance {}", instance.id);
        Ok(instance)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<ComputeInstance> {
        let output = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(aws_error("describe_instances"))?;

        let instance = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .ok_or_else(|| missing("describe_instances", "instance"))?;
        to_compute_instance(instance)
    }

    #[instrument(skip(self))]
    async fn ensure_address(&self, name: &str) -> Result<StaticAddress> {
        if let Some(existing) = self.find_address(name).await? {
            debug!("Address {} already allocated", existing.ip);
            return Ok(existing);
        }

        let output = self
            .ec2
            .allocate_address()
            .domain(DomainType::Vpc)
            .tag_specifications(self.tags(ResourceType::ElasticIp, name))
            .send()
            .await
            .map_err(aws_error("allocate_address"))?;

        let allocation_id = output
            .allocation_id()
            .ok_or_else(|| missing("allocate_address", "allocation id"))?;
        let ip = output
            .public_ip()
            .ok_or_else(|| missing("allocate_address", "public ip"))?
            .parse::<IpAddr>()
            .map_err(|e| SeedError::provisioning("allocate_address", e))?;

        info!("Allocated address {}", ip);
        Ok(StaticAddress {
            allocation_id: allocation_id.to_string(),
            ip,
            instance_id: None,
            association_id: None,
        })
    }

    #[instrument(skip(self))]
    async fn associate_address(
        &self,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<StaticAddress> {
        self.ec2
            .associate_address()
            .allocation_id(allocation_id)
            .instance_id(instance_id)
            .allow_reassociation(true)
            .send()
            .await
            .map_err(aws_error("associate_address"))?;

        self.describe_address(allocation_id).await
    }

    async fn describe_address(&self, allocation_id: &str) -> Result<StaticAddress> {
        let output = self
            .ec2
            .describe_addresses()
            .allocation_ids(allocation_id)
            .send()
            .await
            .map_err(aws_error("describe_addresses"))?;

        let address = output
            .addresses()
            .first()
            .ok_or_else(|| missing("describe_addresses", "address"))?;
        to_static_address(address)
    }

    #[instrument(skip(self))]
    async fn ensure_registry_repository(&self, name: &str) -> Result<RegistryRepository> {
        match self
            .ecr
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(output) => {
                if let Some(uri) = output.repositories().first().and_then(|r| r.repository_uri()) {
                    return Ok(RegistryRepository {
                        name: name.to_string(),
                        uri: uri.to_string(),
                    });
                }
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_repository_not_found_exception()) => {}
            Err(e) => return Err(aws_error("describe_repositories")(e)),
        }

        let output = self
            .ecr
            .create_repository()
            .repository_name(name)
            .image_tag_mutability(ImageTagMutability::Mutable)
            .image_scanning_configuration(
                ImageScanningConfiguration::builder()
                    .scan_on_push(true)
                    .build(),
            )
            .send()
            .await
            .map_err(aws_error("create_repository"))?;

        let uri = output
            .repository()
            .and_then(|r| r.repository_uri())
            .ok_or_else(|| missing("create_repository", "repository uri"))?;

        info!("Created registry repository {}", uri);
        Ok(RegistryRepository {
            name: name.to_string(),
            uri: uri.to_string(),
        })
    }

    async fn find_instance(&self, name: &str) -> Result<Option<ComputeInstance>> {
        let output = self
            .ec2
            .describe_instances()
            .filters(name_filter(name))
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("pending")
                    .values("running")
                    .values("stopping")
                    .values("stopped")
                    .build(),
            )
            .send()
            .await
            .map_err(aws_error("describe_instances"))?;

        output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .map(to_compute_instance)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        match self
            .ec2
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(_) => info!("Terminating instance {}", instance_id),
            Err(e) if is_not_found(&e) => {
                warn!("Instance {} already gone", instance_id);
                return Ok(());
            }
            Err(e) => return Err(aws_error("terminate_instances")(e)),
        }

        self.wait_for_termination(instance_id).await
    }

    async fn find_address(&self, name: &str) -> Result<Option<StaticAddress>> {
        let output = self
            .ec2
            .describe_addresses()
            .filters(name_filter(name))
            .send()
            .await
            .map_err(aws_error("describe_addresses"))?;

        output
            .addresses()
            .first()
            .map(to_static_address)
            .transpose()
    }

    #[instrument(skip(self, address), fields(address = %address.ip))]
    async fn release_address(&self, address: &StaticAddress) -> Result<()> {
        if let Some(association_id) = &address.association_id {
            match self
                .ec2
                .disassociate_address()
                .association_id(association_id)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(aws_error("disassociate_address")(e)),
            }
        }

        match self
            .ec2
            .release_address()
            .allocation_id(&address.allocation_id)
            .send()
            .await
        {
            Ok(_) => info!("Released address {}", address.ip),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(aws_error("release_address")(e)),
        }
        Ok(())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.ec2
            .delete_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(aws_error("delete_key_pair"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_security_group(&self, name: &str) -> Result<()> {
        let Some(group_id) = self.find_security_group(name).await? else {
            return Ok(());
        };

        match self
            .ec2
            .delete_security_group()
            .group_id(&group_id)
            .send()
            .await
        {
            Ok(_) => info!("Deleted security group {}", group_id),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(aws_error("delete_security_group")(e)),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_network(&self, name: &str) -> Result<()> {
        let Some(vpc_id) = self.find_vpc(name).await? else {
            return Ok(());
        };

        if let Some(gateway_id) = self.find_internet_gateway(&vpc_id).await? {
            self.ec2
                .detach_internet_gateway()
                .internet_gateway_id(&gateway_id)
                .vpc_id(&vpc_id)
                .send()
                .await
                .map_err(aws_error("detach_internet_gateway"))?;
            self.ec2
                .delete_internet_gateway()
                .internet_gateway_id(&gateway_id)
                .send()
                .await
                .map_err(aws_error("delete_internet_gateway"))?;
        }

        while let Some(subnet_id) = self.find_subnet(&vpc_id).await? {
            self.ec2
                .delete_subnet()
                .subnet_id(&subnet_id)
                .send()
                .await
                .map_err(aws_error("delete_subnet"))?;
        }

        self.ec2
            .delete_vpc()
            .vpc_id(&vpc_id)
            .send()
            .await
            .map_err(aws_error("delete_vpc"))?;

        info!("Deleted VPC {}", vpc_id);
        Ok(())
    }
}
