// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{run_with_stdin, RemoteExecutor, RemoteOutput, RemoteTarget};
use crate::error::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Runs scripts with a local POSIX shell, ignoring the target host
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        ShellExecutor {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn run(&self, target: &RemoteTarget, script: &str) -> Result<RemoteOutput> {
        debug!("Running script locally in place of {}", target.host);
        let mut command = Command::new(&self.shell);
        command.arg("-s");
        run_with_stdin(command, &target.host, script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeedError;
    use secrecy::SecretString;

    fn target() -> RemoteTarget {
        RemoteTarget {
            host: "localhost".to_string(),
            port: 22,
            user: "root".to_string(),
            private_key: SecretString::from(String::new()),
        }
    }

    #[tokio::test]
    async fn test_collects_stdout_stderr_and_exit_code() {
        let output = ShellExecutor::new()
            .run(&target(), "echo out\necho err >&2\nexit 4\n")
            .await
            .unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, Some(4));
    }

    #[tokio::test]
    async fn test_unknown_shell_is_connection_error() {
        let result = ShellExecutor::with_shell("/nonexistent/sh")
            .run(&target(), "true")
            .await;

        assert!(matches!(result, Err(SeedError::Connection { .. })));
    }
}
