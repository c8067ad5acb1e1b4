// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::poll::CRD_ESTABLISHED_TIMEOUT_SECS;
use crate::error::{Result, SeedError};
use crate::poll::{wait_until, Backoff};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client};
use kube_runtime::wait::{await_condition, conditions::is_crd_established};
use std::time::Duration;
use tracing::{info, instrument};

/// Wait for every named CRD to be registered and report `Established`.
///
/// A CRD that does not exist yet is polled for with exponential backoff;
/// once it exists the wait switches to a watch on its conditions.
#[instrument(skip(client))]
pub async fn wait_for_crds_established(client: &Client, names: &[String]) -> Result<()> {
    wait_for_crds_established_within(
        client,
        names,
        Backoff::with_timeout(Duration::from_secs(CRD_ESTABLISHED_TIMEOUT_SECS)),
    )
    .await
}

pub async fn wait_for_crds_established_within(
    client: &Client,
    names: &[String],
    backoff: Backoff,
) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    for name in names {
        let what = format!("CRD {} to be registered", name);
        wait_until(&what, backoff, || async {
            Ok(crds.get_opt(name).await?.map(|_| ()))
        })
        .await?;

        let established = await_condition(crds.clone(), name, is_crd_established());
        tokio::time::timeout(backoff.timeout, established)
            .await
            .map_err(|_| SeedError::Timeout {
                what: format!("CRD {} to be established", name),
                secs: backoff.timeout.as_secs(),
            })?
            .map_err(|e| SeedError::Release {
                name: name.clone(),
                message: format!("watch on CRD failed: {}", e),
            })?;
        info!("CRD {} is established", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;

    #[tokio::test(start_paused = true)]
    async fn test_missing_crd_times_out() {
        let client = MockService::new().into_client();
        let backoff = Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(4),
            timeout: Duration::from_secs(20),
        };

        let result = wait_for_crds_established_within(
            &client,
            &["gitrepositories.source.toolkit.fluxcd.io".to_string()],
            backoff,
        )
        .await;

        assert!(matches!(
            result,
            Err(SeedError::Timeout { ref what, .. }) if what.contains("gitrepositories")
        ));
    }

    #[tokio::test]
    async fn test_no_crds_is_immediately_ready() {
        let client = MockService::new().into_client();
        wait_for_crds_established(&client, &[]).await.unwrap();
    }
}
