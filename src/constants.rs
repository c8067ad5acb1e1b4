// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "kubeseed";

/// Tag and label keys attached to everything kubeseed creates
pub mod labels {
    /// Cloud tag carrying the stable logical name of a resource
    pub const NAME_TAG: &str = "Name";
    /// Cloud tag and Kubernetes label identifying the owning deployment
    pub const DEPLOYMENT: &str = "kubeseed.io/deployment";
    /// Kubernetes label marking objects managed by kubeseed
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// Remote bootstrap defaults
pub mod bootstrap {
    /// Where k3s writes its admin kubeconfig
    pub const KUBECONFIG_PATH: &str = "/etc/rancher/k3s/k3s.yaml";
    /// The endpoint k3s writes into its kubeconfig
    pub const LOOPBACK_ENDPOINT: &str = "https://127.0.0.1:6443";
    /// Probe attempts made by the remote script
    pub const PROBE_RETRIES: u32 = 20;
    /// Seconds slept between probe attempts
    pub const PROBE_INTERVAL_SECS: u64 = 5;
    /// Exit code of the probe script when the artifact never appeared
    pub const PROBE_EXHAUSTED_EXIT_CODE: i32 = 3;
    /// Extra time granted on top of the remote retry budget for channel setup
    pub const CHANNEL_GRACE_SECS: u64 = 30;
    pub const SSH_PORT: u16 = 22;
    pub const SSH_READY_TIMEOUT_SECS: u64 = 300;
}

/// Polling configuration for waits on cloud and cluster state
pub mod poll {
    /// Initial polling interval in seconds
    pub const POLL_INTERVAL_SECS: u64 = 2;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 30;
    /// How long to wait for a release's CRDs to become established
    pub const CRD_ESTABLISHED_TIMEOUT_SECS: u64 = 180;
    /// How long to wait for a launched instance to reach the running state
    pub const INSTANCE_RUNNING_TIMEOUT_SECS: u64 = 600;
    /// Upper bound accepted for any configured wait
    pub const MAX_WAIT_SECS: u64 = 86_400;
}

/// Registry pull credential refresh
pub mod refresh {
    /// Namespaces that receive the registry pull secret
    pub const NAMESPACES: &[&str] = &["default", "apps", "flux-system"];
    /// Name of the pull secret created in every namespace
    pub const SECRET_NAME: &str = "ecr-pull-secret";
    /// Service account patched to reference the pull secret
    pub const SERVICE_ACCOUNT: &str = "default";
    /// Name shared by the refresh job's service account, role and binding
    pub const JOB_NAME: &str = "registry-credential-refresh";
    pub const DEFAULT_SCHEDULE: &str = "0 */6 * * *";
}
