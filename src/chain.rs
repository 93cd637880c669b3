use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, H256};

use crate::contracts::ContractArtifact;
use crate::error::DeployError;

pub mod rpc;

pub use rpc::RpcChainClient;

/// A contract landing on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub address: Address,
    pub transaction_hash: Option<H256>,
}

/// A one-shot setup call, run on a proxy atomically with its deployment.
#[derive(Debug, Clone)]
pub struct InitCall {
    pub function: String,
    pub args: Vec<Token>,
}

/// The chain-interaction seam. The runner drives deployments exclusively
/// through this trait so its logic is testable against a simulated chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Deploys a contract, calling its constructor with `args`.
    async fn deploy_contract(
        &self,
        artifact: &ContractArtifact,
        args: Vec<Token>,
    ) -> Result<Deployed, DeployError>;

    /// Deploys the logic contract, then deploys a proxy pointing at it with
    /// the initializer call baked into the proxy's constructor. The
    /// initializer therefore runs exactly once, with no window in which the
    /// proxy exists uninitialized.
    async fn deploy_proxy_with_initializer(
        &self,
        logic: &ContractArtifact,
        proxy: &ContractArtifact,
        init: InitCall,
    ) -> Result<Deployed, DeployError>;

    /// Deploys a new logic contract and repoints `proxy` at it.
    async fn upgrade_implementation(
        &self,
        proxy: Address,
        new_logic: &ContractArtifact,
    ) -> Result<Deployed, DeployError>;

    /// Current implementation behind `proxy`, or None when the address is
    /// not a recognized upgradeable proxy. Read-only.
    async fn implementation_of(
        &self,
        proxy: Address,
    ) -> Result<Option<Address>, DeployError>;

    /// Queries ERC-20 name and symbol, None when the contract does not
    /// expose them. Read-only.
    async fn erc20_metadata(
        &self,
        address: Address,
    ) -> Result<Option<(String, String)>, DeployError>;
}
