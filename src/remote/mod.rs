// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote execution over a secure channel, and the bootstrap poller built on it.

pub mod poller;
pub mod reachability;
pub mod shell;
pub mod ssh;

pub use poller::{BootstrapPoller, BootstrapProbe};
pub use reachability::wait_for_port;
pub use shell::ShellExecutor;
pub use ssh::OpenSshExecutor;

use crate::error::{Result, SeedError};
use async_trait::async_trait;
use secrecy::SecretString;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Host and identity a script is executed as
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

/// Runs a single script on a target and reports its output.
///
/// Implementations return [`SeedError::Connection`] when the channel could not
/// be opened; a script that ran and failed is reported through `exit_code`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, target: &RemoteTarget, script: &str) -> Result<RemoteOutput>;
}

/// Spawn `command`, feed `script` on stdin and collect its output
pub(crate) async fn run_with_stdin(
    mut command: Command,
    host: &str,
    script: &str,
) -> Result<RemoteOutput> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SeedError::Connection {
            host: host.to_string(),
            message: format!("failed to spawn: {}", e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| SeedError::Connection {
                host: host.to_string(),
                message: format!("failed to send script: {}", e),
            })?;
        // Closing stdin ends the script for `sh -s`
        drop(stdin);
    }

    let output = child.wait_with_output().await?;
    Ok(RemoteOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}
