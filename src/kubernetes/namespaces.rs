// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use crate::constants::{labels, FIELD_MANAGER};
use crate::error::{Result, SeedError};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Ensure a namespace exists in the cluster, create if it doesn't
#[instrument(skip(client))]
pub async fn ensure_namespace_exists(client: &Client, namespace: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Ok(_) => {
            debug!("Namespace {} already exists", namespace);
            Ok(())
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!("Creating namespace {}", namespace);
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    labels: Some(BTreeMap::from([(
                        labels::MANAGED_BY.to_string(),
                        FIELD_MANAGER.to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            };
            match namespaces.create(&PostParams::default(), &ns).await {
                Ok(_) => info!("Namespace {} created successfully", namespace),
                // Someone else created it between our get and create
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    debug!("Namespace {} appeared concurrently", namespace)
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Err(e) => Err(SeedError::Namespace(format!(
            "Failed to check/create namespace {}: {}",
            namespace, e
        ))),
    }
}
