// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Provisioning failed during {operation}: {message}")]
    Provisioning { operation: String, message: String },

    #[error("Could not open remote channel to {host}: {message}")]
    Connection { host: String, message: String },

    #[error("Bootstrap artifact not available after {attempts} attempts: {diagnostic}")]
    BootstrapTimeout { attempts: u32, diagnostic: String },

    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Bootstrap polling was cancelled")]
    BootstrapCancelled,

    #[error("Endpoint {endpoint} not found in bootstrap artifact, refusing to use it unmodified")]
    EndpointNotRewritten { endpoint: String },

    #[error("Failed to parse kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Release {name} failed: {message}")]
    Release { name: String, message: String },

    #[error("Failed to apply {resource}: {message}")]
    Apply { resource: String, message: String },

    #[error("Invalid resource plan: {0}")]
    Plan(String),

    #[error("Namespace creation failed: {0}")]
    Namespace(String),

    #[error("Registry credential refresh failed: {0}")]
    Refresh(String),

    #[error("Key pair error: {0}")]
    KeyPair(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeedError {
    pub fn provisioning(operation: &str, message: impl std::fmt::Display) -> Self {
        SeedError::Provisioning {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    pub fn apply(resource: &str, message: impl std::fmt::Display) -> Self {
        SeedError::Apply {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeedError>;
