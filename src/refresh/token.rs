// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{info, instrument};

/// Short-lived credentials for pulling from a registry
#[derive(Debug, Clone)]
pub struct RegistryToken {
    /// Registry host, e.g. `123456789012.dkr.ecr.us-east-1.amazonaws.com`
    pub registry: String,
    pub username: String,
    pub password: SecretString,
}

impl RegistryToken {
    /// Body of a `kubernetes.io/dockerconfigjson` secret
    pub fn docker_config_json(&self) -> String {
        let password = self.password.expose_secret();
        let auth = STANDARD.encode(format!("{}:{}", self.username, password));
        json!({
            "auths": {
                (self.registry.clone()): {
                    "username": self.username,
                    "password": password,
                    "auth": auth,
                }
            }
        })
        .to_string()
    }
}

#[async_trait]
pub trait RegistryTokenSource: Send + Sync {
    async fn token(&self) -> Result<RegistryToken>;
}

/// Fetches pull tokens from ECR with the default credential chain
pub struct EcrTokenSource {
    client: aws_sdk_ecr::Client,
}

impl EcrTokenSource {
    /// Region and credentials come from the environment (`AWS_REGION`, `AWS_ACCESS_KEY_ID`, ...)
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        EcrTokenSource {
            client: aws_sdk_ecr::Client::new(&config),
        }
    }
}

#[async_trait]
impl RegistryTokenSource for EcrTokenSource {
    #[instrument(skip(self))]
    async fn token(&self) -> Result<RegistryToken> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| SeedError::Refresh(format!("{}", DisplayErrorContext(&e))))?;

        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| SeedError::Refresh("no authorization data returned".to_string()))?;
        let encoded = data
            .authorization_token()
            .ok_or_else(|| SeedError::Refresh("authorization token missing".to_string()))?;
        let endpoint = data
            .proxy_endpoint()
            .ok_or_else(|| SeedError::Refresh("proxy endpoint missing".to_string()))?;

        let (username, password) = decode_authorization(encoded)?;
        let token = RegistryToken {
            registry: registry_host(endpoint),
            username,
            password,
        };
        info!("Obtained pull token for {}", token.registry);
        Ok(token)
    }
}

/// Split a base64 `user:password` authorization token
pub fn decode_authorization(encoded: &str) -> Result<(String, SecretString)> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| SeedError::Refresh(format!("invalid authorization token: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| SeedError::Refresh(format!("invalid authorization token: {}", e)))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| SeedError::Refresh("authorization token has no separator".to_string()))?;
    Ok((username.to_string(), SecretString::from(password.to_string())))
}

fn registry_host(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_authorization() {
        let encoded = STANDARD.encode("AWS:s3cr3t:with:colons");
        let (username, password) = decode_authorization(&encoded).unwrap();

        assert_eq!(username, "AWS");
        assert_eq!(password.expose_secret(), "s3cr3t:with:colons");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_authorization("%%%").is_err());
        assert!(decode_authorization(&STANDARD.encode("nocolon")).is_err());
    }

    #[test]
    fn test_registry_host_strips_scheme() {
        assert_eq!(
            registry_host("https://123456789012.dkr.ecr.us-east-1.amazonaws.com"),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_docker_config_json() {
        let token = RegistryToken {
            registry: "123456789012.dkr.ecr.us-east-1.amazonaws.com".to_string(),
            username: "AWS".to_string(),
            password: SecretString::from("pw".to_string()),
        };
        let parsed: serde_json::Value = serde_json::from_str(&token.docker_config_json()).unwrap();
        let entry = &parsed["auths"]["123456789012.dkr.ecr.us-east-1.amazonaws.com"];

        assert_eq!(entry["username"], "AWS");
        assert_eq!(entry["auth"], STANDARD.encode("AWS:pw"));
    }
}
