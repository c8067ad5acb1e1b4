// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{run_with_stdin, RemoteExecutor, RemoteOutput, RemoteTarget};
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument};

/// OpenSSH reports its own failures (refused, auth, unreachable) with this status
const SSH_FAILURE_EXIT_CODE: i32 = 255;

/// Executes scripts through the system `ssh` client with key-only authentication
#[derive(Debug, Clone)]
pub struct OpenSshExecutor {
    binary: String,
    connect_timeout_secs: u64,
}

impl OpenSshExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        OpenSshExecutor {
            binary: binary.into(),
            connect_timeout_secs: 10,
        }
    }

    fn args(&self, target: &RemoteTarget, key_path: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            key_path.display().to_string(),
            "-p".to_string(),
            target.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            format!("{}@{}", target.user, target.host),
            "sh -s".to_string(),
        ]
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    #[instrument(skip(self, target, script), fields(host = %target.host, user = %target.user))]
    async fn run(&self, target: &RemoteTarget, script: &str) -> Result<RemoteOutput> {
        // NamedTempFile is created with mode 0600, which ssh insists on
        let mut key_file = tempfile::NamedTempFile::new()?;
        key_file.write_all(target.private_key.expose_secret().as_bytes())?;
        key_file.flush()?;

        let mut command = Command::new(&self.binary);
        command.args(self.args(target, key_file.path()));
        debug!("Running remote script via {}", self.binary);

        let output = run_with_stdin(command, &target.host, script).await?;
        channel_result(&target.host, output)
    }
}

fn channel_result(host: &str, output: RemoteOutput) -> Result<RemoteOutput> {
    if output.exit_code == Some(SSH_FAILURE_EXIT_CODE) {
        return Err(SeedError::Connection {
            host: host.to_string(),
            message: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
