// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry pull credential refresh: the scheduled job's declaration and the
//! run it performs inside the cluster.

pub mod job;
pub mod runner;
pub mod token;

pub use job::{refresh_manifests, REFRESH_COMMAND};
pub use runner::{NamespaceOutcome, PullSecretRefresher, RefreshReport};
pub use token::{EcrTokenSource, RegistryToken, RegistryTokenSource};

use crate::constants::refresh::NAMESPACES;
use crate::error::Result;
use kube::Client;

/// Fetch a fresh token and push it into every compiled-in namespace
pub async fn refresh_pull_secrets(
    client: Client,
    source: &dyn RegistryTokenSource,
) -> Result<RefreshReport> {
    let token = source.token().await?;
    PullSecretRefresher::new(client)
        .run(&token, NAMESPACES)
        .await
        .into_result()
}
