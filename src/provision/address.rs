// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Static address allocation and association.

use crate::cloud::{CloudProvider, StaticAddress};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Binds the deployment's static address to whichever instance currently serves it.
///
/// The address is a singleton per deployment. Association is last-writer-wins
/// at the provider, so the binder never issues two associate calls at once.
pub struct AddressBinder {
    provider: Arc<dyn CloudProvider>,
    associate_lock: Mutex<()>,
}

impl AddressBinder {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        AddressBinder {
            provider,
            associate_lock: Mutex::new(()),
        }
    }

    /// Allocate the address called `name`, or return the existing allocation
    #[instrument(skip(self))]
    pub async fn allocate(&self, name: &str) -> Result<StaticAddress> {
        let address = self.provider.ensure_address(name).await?;
        info!(
            "Static address {} ({}) ready",
            address.ip, address.allocation_id
        );
        Ok(address)
    }

    /// Point `address` at `instance_id`, replacing any previous association
    #[instrument(skip(self, address), fields(ip = %address.ip))]
    pub async fn associate(
        &self,
        address: &StaticAddress,
        instance_id: &str,
    ) -> Result<StaticAddress> {
        let _guard = self.associate_lock.lock().await;

        if address.instance_id.as_deref() == Some(instance_id) {
            return Ok(address.clone());
        }
        if let Some(previous) = &address.instance_id {
            info!("Moving {} from {} to {}", address.ip, previous, instance_id);
        }

        let bound = self
            .provider
            .associate_address(&address.allocation_id, instance_id)
            .await?;
        info!("Associated {} with {}", bound.ip, instance_id);
        Ok(bound)
    }

    /// Instance the address currently resolves to
    pub async fn resolve(&self, address: &StaticAddress) -> Result<Option<String>> {
        Ok(self
            .provider
            .describe_address(&address.allocation_id)
            .await?
            .instance_id)
    }
}
