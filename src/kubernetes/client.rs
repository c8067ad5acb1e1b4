// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane client creation from a fetched kubeconfig

use crate::error::{Result, SeedError};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use tracing::{info, instrument};

/// Build client configuration from kubeconfig text
pub async fn config_from_kubeconfig(kubeconfig: &str) -> Result<KConfig> {
    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| SeedError::Kubeconfig(format!("Failed to parse kubeconfig: {}", e)))?;

    KConfig::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| SeedError::Kubeconfig(format!("Failed to create config: {}", e)))
}

/// Create a Kubernetes client from a kubeconfig string
#[instrument(skip(kubeconfig))]
pub async fn client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    let client_config = config_from_kubeconfig(kubeconfig).await?;
    info!("Connecting to control plane at {}", client_config.cluster_url);

    Client::try_from(client_config)
        .map_err(|e| SeedError::Kubeconfig(format!("Failed to create client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::kubeconfig_for;

    #[tokio::test]
    async fn test_config_points_at_rewritten_server() {
        let config = config_from_kubeconfig(&kubeconfig_for("https://203.0.113.10:6443"))
            .await
            .unwrap();

        assert_eq!(config.cluster_url.host(), Some("203.0.113.10"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert!(config.accept_invalid_certs);
    }

    #[tokio::test]
    async fn test_client_builds_from_kubeconfig() {
        assert!(client_from_kubeconfig(&kubeconfig_for("https://203.0.113.10:6443"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_garbage_is_kubeconfig_error() {
        let result = config_from_kubeconfig("clusters: [not: valid").await;

        assert!(matches!(result, Err(SeedError::Kubeconfig(_))));
    }
}
