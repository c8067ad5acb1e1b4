// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fetching the credential artifact a freshly booted instance produces.
//!
//! The waiting happens on the remote side: one channel is opened and a probe
//! loop runs there until the file shows up or the retry budget is spent.
//! Locally the call is bounded by that budget plus a grace period and can be
//! cancelled.

use super::{RemoteExecutor, RemoteTarget};
use crate::config::BootstrapConfig;
use crate::constants::bootstrap::{CHANNEL_GRACE_SECS, PROBE_EXHAUSTED_EXIT_CODE};
use crate::error::{Result, SeedError};
use crate::provision::shell_quote;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Probe-and-wait parameters for a remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapProbe {
    pub path: String,
    pub retries: u32,
    pub interval: Duration,
    /// Check and read the file through sudo
    pub privileged: bool,
}

impl BootstrapProbe {
    pub fn from_config(config: &BootstrapConfig) -> Self {
        BootstrapProbe {
            path: config.kubeconfig_path.clone(),
            retries: config.retries,
            interval: config.interval(),
            privileged: config.privileged,
        }
    }

    /// Longest time the remote loop spends waiting
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.retries)
    }

    /// POSIX script that prints the file once it exists and is non-empty, or
    /// exits 3 after `retries` attempts.
    ///
    /// k3s creates the file before writing it, so an empty file counts as not
    /// there yet. Reads only; safe to run any number of times.
    pub fn script(&self) -> String {
        let sudo = if self.privileged { "sudo " } else { "" };
        format!(
            r#"path={path}
attempt=1
while [ "$attempt" -le {retries} ]; do
  if {sudo}test -s "$path"; then
    exec {sudo}cat "$path"
  fi
  sleep {interval}
  attempt=$((attempt + 1))
done
echo "$path did not appear or stayed empty after {retries} attempts {interval}s apart" >&2
exit {code}
"#,
            path = shell_quote(&self.path),
            retries = self.retries,
            sudo = sudo,
            interval = self.interval.as_secs_f64(),
            code = PROBE_EXHAUSTED_EXIT_CODE,
        )
    }
}

/// Runs a [`BootstrapProbe`] once through a [`RemoteExecutor`]
pub struct BootstrapPoller {
    executor: Arc<dyn RemoteExecutor>,
    probe: BootstrapProbe,
    grace: Duration,
}

impl BootstrapPoller {
    pub fn new(executor: Arc<dyn RemoteExecutor>, probe: BootstrapProbe) -> Self {
        BootstrapPoller {
            executor,
            probe,
            grace: Duration::from_secs(CHANNEL_GRACE_SECS),
        }
    }

    /// Fetch the artifact, failing fatally if the remote loop gives up.
    ///
    /// A channel that cannot be opened is reported as [`SeedError::Connection`],
    /// an exhausted probe as [`SeedError::BootstrapTimeout`] with the remote
    /// diagnostic.
    #[instrument(skip(self, target, cancel), fields(host = %target.host, path = %self.probe.path))]
    pub async fn fetch(
        &self,
        target: &RemoteTarget,
        cancel: &CancellationToken,
    ) -> Result<SecretString> {
        let deadline = self.probe.budget().saturating_add(self.grace);
        let script = self.probe.script();
        info!(
            "Waiting up to {:?} for {} on {}",
            self.probe.budget(),
            self.probe.path,
            target.host
        );

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SeedError::BootstrapCancelled),
            result = tokio::time::timeout(deadline, self.executor.run(target, &script)) => {
                match result {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(SeedError::BootstrapTimeout {
                            attempts: self.probe.retries,
                            diagnostic: format!(
                                "no answer from {} within {}s",
                                target.host,
                                deadline.as_secs()
                            ),
                        })
                    }
                }
            }
        };

        match output.exit_code {
            Some(0) if !output.stdout.trim().is_empty() => {
                info!("Fetched {} ({} bytes)", self.probe.path, output.stdout.len());
                Ok(SecretString::from(output.stdout))
            }
            Some(0) => Err(SeedError::BootstrapTimeout {
                attempts: self.probe.retries,
                diagnostic: format!("{} held only whitespace", self.probe.path),
            }),
            code => {
                if code != Some(PROBE_EXHAUSTED_EXIT_CODE) {
                    warn!("Probe exited with unexpected status {:?}", code);
                }
                Err(SeedError::BootstrapTimeout {
                    attempts: self.probe.retries,
                    diagnostic: output.stderr.trim().to_string(),
                })
            }
        }
    }
}
