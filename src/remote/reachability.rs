// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{Result, SeedError};
use crate::poll::{wait_until, Backoff};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, instrument};

const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait until `addr` accepts TCP connections.
///
/// Runs before opening the remote channel so a booting instance is not
/// mistaken for an unreachable one.
#[instrument(skip(backoff))]
pub async fn wait_for_port(addr: SocketAddr, backoff: Backoff) -> Result<()> {
    let what = format!("{} to accept connections", addr);
    wait_until(&what, backoff, || async {
        match tokio::time::timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(Some(())),
            Ok(Err(_)) | Err(_) => Ok(None),
        }
    })
    .await
    .map_err(|e| match e {
        SeedError::Timeout { secs, .. } => SeedError::Connection {
            host: addr.ip().to_string(),
            message: format!("port {} not reachable within {}s", addr.port(), secs),
        },
        other => other,
    })?;

    info!("{} is reachable", addr);
    Ok(())
}
