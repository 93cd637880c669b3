use clap::Parser;
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::chain::RpcChainClient;
use crate::cli::Args;
use crate::config::Config;
use crate::contracts::ArtifactStore;
use crate::runner::Runner;
use crate::types::DeploymentKind;

pub mod abis;
pub mod chain;
pub mod contracts;
pub mod layout;
pub mod runner;
pub mod serde_utils;

mod args;
mod cli;
mod config;
mod error;
mod registry;
mod types;

async fn start() -> eyre::Result<()> {
    let cmd = Args::parse();

    let config: Config = serde_utils::read_deserialize(&cmd.config).await?;
    let registry = config.registry()?;

    let mut profile = registry.resolve(&cmd.network)?.clone();
    if let Some(rpc_url) = &cmd.rpc_url {
        profile.rpc_url = rpc_url.to_string();
    }

    let request = cmd.procedure.to_request()?;

    let client = RpcChainClient::connect(&profile).await?;
    let runner = Runner::new(ArtifactStore::new(&cmd.artifacts));

    let result = runner.run(&profile, request, &client).await?;

    match result.kind {
        DeploymentKind::Fresh => {
            println!("Contract deployed to: {:?}", result.address);
        }
        DeploymentKind::Upgrade => {
            println!("Proxy upgraded at: {:?}", result.address);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    dotenv::dotenv().ok();

    let filter = EnvFilter::from_default_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(ErrorLayer::default())
        .init();

    match start().await {
        Ok(()) => Ok(()),
        Err(err) => {
            let report = eyre::ErrReport::from(err);
            tracing::error!("{:?}", report);
            std::process::exit(1)
        }
    }
}
