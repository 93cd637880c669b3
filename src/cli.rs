use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ethers::types::Address;
use reqwest::Url;

use crate::contracts::ContractId;
use crate::types::DeploymentRequest;

#[derive(Debug, Clone, Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    /// Path to the network configuration file
    #[clap(short, long, env, default_value = "networks.yml")]
    pub config: PathBuf,

    /// Name of the network profile to deploy against
    #[clap(short, long, env)]
    pub network: String,

    /// Directory containing compiled contract artifacts
    #[clap(short, long, env, default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Overrides the RPC url of the selected network profile
    #[clap(long, env)]
    pub rpc_url: Option<Url>,

    #[clap(subcommand)]
    pub procedure: Procedure,
}

#[derive(Debug, Clone, Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Procedure {
    /// Deploy a new instance of a contract
    Fresh {
        /// The contract to deploy
        #[clap(long)]
        contract: ContractId,

        /// Constructor/initializer arguments as name=value pairs
        #[clap(long = "arg")]
        args: Vec<String>,
    },
    /// Upgrade an existing proxy to a new implementation
    Upgrade {
        /// The contract to deploy as the new implementation
        #[clap(long)]
        contract: ContractId,

        /// Address of the existing proxy
        #[clap(long)]
        proxy: Address,

        /// Artifact name of the currently deployed implementation,
        /// enables the storage layout check
        #[clap(long)]
        baseline: Option<String>,
    },
}

impl Procedure {
    pub fn to_request(&self) -> eyre::Result<DeploymentRequest> {
        match self {
            Self::Fresh { contract, args } => Ok(DeploymentRequest::Fresh {
                contract: *contract,
                args: parse_named_args(args)?,
            }),
            Self::Upgrade {
                contract,
                proxy,
                baseline,
            } => Ok(DeploymentRequest::Upgrade {
                contract: *contract,
                proxy: *proxy,
                baseline: baseline.clone(),
            }),
        }
    }
}

fn parse_named_args(
    raw: &[String],
) -> eyre::Result<HashMap<String, String>> {
    let mut values = HashMap::new();

    for pair in raw {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            eyre::eyre!("expected name=value, got `{pair}`")
        })?;

        if values
            .insert(name.to_string(), value.to_string())
            .is_some()
        {
            eyre::bail!("parameter `{name}` given twice");
        }
    }

    Ok(values)
}
