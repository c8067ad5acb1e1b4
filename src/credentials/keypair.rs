// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ed25519 key pair used for SSH access to the control-plane instance.

use crate::error::{Result, SeedError};
use secrecy::{ExposeSecret, SecretString};
use ssh_key::{rand_core::OsRng, Algorithm, HashAlg, LineEnding, PrivateKey};
use std::path::Path;
use tracing::{info, instrument};

/// Key pair generated once per deployment.
///
/// The private half never leaves this struct except through
/// [`KeyPair::private_openssh`], which hands out the secret wrapper.
pub struct KeyPair {
    private: SecretString,
    public: String,
    fingerprint: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh Ed25519 key pair in-process
    pub fn generate(comment: &str) -> Result<Self> {
        let mut key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .map_err(|e| SeedError::KeyPair(format!("Failed to generate key: {}", e)))?;
        key.set_comment(comment);
        Self::from_private_key(&key)
    }

    /// Parse an OpenSSH-encoded private key
    pub fn from_openssh(pem: &str) -> Result<Self> {
        let key = PrivateKey::from_openssh(pem)
            .map_err(|e| SeedError::KeyPair(format!("Failed to parse private key: {}", e)))?;
        Self::from_private_key(&key)
    }

    fn from_private_key(key: &PrivateKey) -> Result<Self> {
        let private = key
            .to_openssh(LineEnding::LF)
            .map_err(|e| SeedError::KeyPair(format!("Failed to encode private key: {}", e)))?;
        let public = key
            .public_key()
            .to_openssh()
            .map_err(|e| SeedError::KeyPair(format!("Failed to encode public key: {}", e)))?;
        let fingerprint = key.public_key().fingerprint(HashAlg::Sha256).to_string();

        Ok(KeyPair {
            private: SecretString::from(private.as_str().to_string()),
            public,
            fingerprint,
        })
    }

    /// Load the persisted private key, or generate and persist a new one.
    ///
    /// Re-running a deployment must reuse the key the instance was launched with.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn load_or_generate(path: &Path, comment: &str) -> Result<Self> {
        if path.exists() {
            let pem = std::fs::read_to_string(path)?;
            let pair = Self::from_openssh(&pem)?;
            info!(fingerprint = %pair.fingerprint, "Reusing persisted SSH key");
            return Ok(pair);
        }

        let pair = Self::generate(comment)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        crate::outputs::write_private_file(path, pair.private.expose_secret())?;
        info!(fingerprint = %pair.fingerprint, "Generated new SSH key");
        Ok(pair)
    }

    /// OpenSSH one-line public key, suitable for registration with the provider
    pub fn public_openssh(&self) -> &str {
        &self.public
    }

    /// OpenSSH PEM private key
    pub fn private_openssh(&self) -> &SecretString {
        &self.private
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
