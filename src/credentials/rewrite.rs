// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rewrites the loopback endpoint in a fetched kubeconfig to the public address.

use crate::error::{Result, SeedError};
use std::net::IpAddr;
use url::Url;

/// Result of a literal endpoint substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// How many occurrences were replaced. Zero means the input came back unchanged.
    pub replacements: usize,
}

impl Rewrite {
    pub fn is_noop(&self) -> bool {
        self.replacements == 0
    }
}

/// Replace every literal occurrence of `from` in `artifact` with `to`.
///
/// Matching is textual and non-overlapping, scanning left to right. All bytes
/// outside the matches are preserved.
pub fn rewrite(artifact: &str, from: &str, to: &str) -> Rewrite {
    if from.is_empty() {
        return Rewrite {
            text: artifact.to_string(),
            replacements: 0,
        };
    }

    Rewrite {
        text: artifact.replace(from, to),
        replacements: artifact.matches(from).count(),
    }
}

/// Build the externally routable endpoint by swapping the host of `loopback`
/// for `address`, keeping scheme, port and path.
pub fn endpoint_for_address(loopback: &str, address: IpAddr) -> Result<String> {
    let mut url = Url::parse(loopback).map_err(|e| {
        SeedError::Config(format!("Invalid loopback endpoint {}: {}", loopback, e))
    })?;
    url.set_ip_host(address).map_err(|_| {
        SeedError::Config(format!("Endpoint {} cannot carry a host", loopback))
    })?;

    // Url normalises an empty path to "/", which would not match the artifact text
    let mut endpoint = url.to_string();
    if !loopback.ends_with('/') && endpoint.ends_with('/') {
        endpoint.pop();
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    const K3S_KUBECONFIG: &str = r#"apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTi...
    server: https://127.0.0.1:6443
  name: default
contexts:
- context:
    cluster: default
    user: default
  name: default
current-context: default
kind: Config
preferences: {}
users:
- name: default
  user:
    client-certificate-data: LS0tLS1CRUdJTi...
    client-key-data: LS0tLS1CRUdJTi...
"#;

    #[test]
    fn test_rewrite_replaces_server_endpoint() {
        let out = rewrite(
            K3S_KUBECONFIG,
            "https://127.0.0.1:6443",
            "https://203.0.113.10:6443",
        );

        assert_eq!(out.replacements, 1);
        assert!(out.text.contains("server: https://203.0.113.10:6443"));
        assert!(!out.text.contains("127.0.0.1"));
    }

    #[test]
    fn test_rewrite_preserves_everything_else() {
        let out = rewrite(
            K3S_KUBECONFIG,
            "https://127.0.0.1:6443",
            "https://203.0.113.10:6443",
        );

        let expected = K3S_KUBECONFIG.replacen(
            "https://127.0.0.1:6443",
            "https://203.0.113.10:6443",
            1,
        );
        assert_eq!(out.text, expected);
    }

    #[test]
    fn test_rewrite_replaces_every_occurrence() {
        let artifact = "a https://127.0.0.1:6443 b https://127.0.0.1:6443 c";
        let out = rewrite(artifact, "https://127.0.0.1:6443", "https://x:6443");

        assert_eq!(out.replacements, 2);
        assert_eq!(out.text, "a https://x:6443 b https://x:6443 c");
    }

    #[test]
    fn test_rewrite_is_literal_not_pattern() {
        // A regex-style dot must not match arbitrary characters
        let artifact = "server: https://127x0x0x1:6443";
        let out = rewrite(artifact, "https://127.0.0.1:6443", "https://203.0.113.10:6443");

        assert!(out.is_noop());
        assert_eq!(out.text, artifact);
    }

    #[test]
    fn test_rewrite_ignores_partial_matches() {
        let out = rewrite("https://127.0.0.1:644", "https://127.0.0.1:6443", "x");
        assert!(out.is_noop());

        // The literal inside a longer token is still the literal
        let longer = rewrite(
            "server: https://127.0.0.1:64430",
            "https://127.0.0.1:6443",
            "https://203.0.113.10:6443",
        );
        assert_eq!(longer.text, "server: https://203.0.113.10:64430");
    }

    #[test]
    fn test_rewrite_without_occurrence_is_noop() {
        let artifact = "server: https://10.0.1.5:6443";
        let out = rewrite(artifact, "https://127.0.0.1:6443", "https://203.0.113.10:6443");

        assert!(out.is_noop());
        assert_eq!(out.text, artifact);
    }

    #[test]
    fn test_rewrite_is_idempotent_once_rewritten() {
        let from = "https://127.0.0.1:6443";
        let to = "https://203.0.113.10:6443";
        let once = rewrite(K3S_KUBECONFIG, from, to);
        let twice = rewrite(&once.text, from, to);

        assert!(twice.is_noop());
        assert_eq!(twice.text, once.text);
    }

    #[test]
    fn test_rewrite_output_length_may_change() {
        let out = rewrite("https://127.0.0.1:6443", "https://127.0.0.1:6443", "https://a:6443");
        assert_eq!(out.text.len(), "https://a:6443".len());
    }

    #[test]
    fn test_rewrite_with_empty_pattern_is_noop() {
        let out = rewrite("abc", "", "x");
        assert!(out.is_noop());
        assert_eq!(out.text, "abc");
    }

    #[test]
    fn test_endpoint_for_address_keeps_scheme_and_port() {
        let endpoint =
            endpoint_for_address("https://127.0.0.1:6443", "203.0.113.10".parse().unwrap())
                .unwrap();
        assert_eq!(endpoint, "https://203.0.113.10:6443");
    }

    #[test]
    fn test_endpoint_for_address_rejects_invalid_loopback() {
        let result = endpoint_for_address("not a url", "203.0.113.10".parse().unwrap());
        assert!(matches!(result, Err(SeedError::Config(_))));
    }
}
