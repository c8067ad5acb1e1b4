// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! User-data script that installs a single-node k3s server at first boot.

use std::fmt::Write;
use std::net::IpAddr;

const K3S_INSTALL_URL: &str = "https://get.k3s.io";

/// Parameters for the k3s install script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootScript {
    /// Address added to the API server certificate so the rewritten kubeconfig validates
    pub tls_san: IpAddr,
    pub k3s_version: Option<String>,
    pub k3s_channel: String,
}

impl BootScript {
    pub fn render(&self) -> String {
        let mut env = String::new();
        // Channel and version are mutually exclusive for the installer, version wins
        match &self.k3s_version {
            Some(version) => {
                let _ = write!(env, "INSTALL_K3S_VERSION={} ", shell_quote(version));
            }
            None => {
                let _ = write!(env, "INSTALL_K3S_CHANNEL={} ", shell_quote(&self.k3s_channel));
            }
        }

        format!(
            r#"#!/bin/sh
set -eu

curl -sfL {url} | {env}sh -s - server \
  --write-kubeconfig-mode 644 \
  --tls-san {san}
"#,
            url = K3S_INSTALL_URL,
            env = env,
            san = self.tls_san,
        )
    }
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
