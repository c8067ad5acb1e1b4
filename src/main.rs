// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kubeseed::addons::HelmInstaller;
use kubeseed::cloud::Ec2Provider;
use kubeseed::config::Config;
use kubeseed::orchestrator::{Deployer, KubeConnector};
use kubeseed::provision::Provisioner;
use kubeseed::refresh::{refresh_pull_secrets, EcrTokenSource, NamespaceOutcome};
use kubeseed::remote::OpenSshExecutor;

#[derive(Parser)]
#[command(name = "kubeseed", version, about = "Bootstrap a single-node k3s cluster with Flux")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision the instance, fetch its kubeconfig and apply the GitOps resources
    Deploy,
    /// Delete every cloud resource of the deployment
    Destroy,
    /// Refresh registry pull secrets; run by the in-cluster CronJob
    RefreshPullSecrets,
}

fn deployer(config: &Config, provider: Ec2Provider) -> Deployer {
    Deployer::new(
        Provisioner::new(Arc::new(provider)),
        Arc::new(OpenSshExecutor::new(config.ssh_binary.clone())),
        Arc::new(KubeConnector::new(HelmInstaller::new(
            config.helm_binary.clone(),
        ))),
        config.output_dir.clone(),
    )
}

async fn deploy() -> Result<()> {
    let config = Config::from_env()?;
    let spec = config.load_deployment()?;
    info!("Deploying {} to {}", spec.name, spec.region);

    let provider = Ec2Provider::new(&spec.region, &spec.name).await;
    let deployer = deployer(&config, provider);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling deployment");
            on_signal.cancel();
        }
    });

    let report = deployer
        .deploy(&spec, &cancel)
        .await
        .with_context(|| format!("Deployment {} failed", spec.name))?;
    info!(
        "Cluster {} available at {} (outputs in {})",
        report.instance_id,
        report.public_address,
        report.outputs_file.display()
    );
    Ok(())
}

async fn destroy() -> Result<()> {
    let config = Config::from_env()?;
    let spec = config.load_deployment()?;

    let provider = Ec2Provider::new(&spec.region, &spec.name).await;
    deployer(&config, provider)
        .destroy(&spec)
        .await
        .with_context(|| format!("Teardown of {} failed", spec.name))?;
    Ok(())
}

async fn refresh() -> Result<()> {
    let client = Client::try_default().await?;
    let source = EcrTokenSource::from_env().await;

    let report = refresh_pull_secrets(client, &source)
        .await
        .context("Registry credential refresh failed")?;
    info!(
        "Refreshed pull secrets in {} namespaces ({} without service account, {} failed)",
        report.count(&NamespaceOutcome::Refreshed),
        report.count(&NamespaceOutcome::IdentityMissing),
        report.failed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Deploy => deploy().await,
        Command::Destroy => destroy().await,
        Command::RefreshPullSecrets => refresh().await,
    }
}
