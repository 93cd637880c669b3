use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::contract::ContractFactory;
use ethers::prelude::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer, Wallet};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use hex_literal::hex;
use tracing::{info, instrument, warn};

use crate::abis::{Erc1967Proxy, Erc20Metadata};
use crate::chain::{ChainClient, Deployed, InitCall};
use crate::config::NetworkProfile;
use crate::contracts::ContractArtifact;
use crate::error::DeployError;

/// keccak256("eip1967.proxy.implementation") - 1, where every compliant
/// proxy stores its implementation address.
const EIP1967_IMPLEMENTATION_SLOT: [u8; 32] =
    hex!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

type RpcSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Chain client backed by a JSON-RPC endpoint, bound to one network
/// profile for its whole lifetime. The nonce is fetched once at connect
/// time and incremented locally per transaction.
pub struct RpcChainClient {
    signer: Arc<RpcSigner>,
    nonce: AtomicU64,
    gas_limit: Option<u64>,
    gas_price: Option<u64>,
}

impl RpcChainClient {
    #[instrument(skip_all, fields(network = %profile.name))]
    pub async fn connect(
        profile: &NetworkProfile,
    ) -> Result<Self, DeployError> {
        profile.ensure_usable()?;
        let private_key = profile.resolve_credential()?;

        let provider = Provider::<Http>::try_from(profile.rpc_url.as_str())
            .map_err(|e| DeployError::NetworkUnreachable(e.to_string()))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| DeployError::NetworkUnreachable(e.to_string()))?
            .as_u64();

        if let Some(configured) = profile.chain_id {
            if configured.0 != chain_id {
                warn!(
                    configured = configured.0,
                    reported = chain_id,
                    "configured chain id differs from the chain's, using the chain's"
                );
            }
        }

        let wallet =
            Wallet::from(private_key.key.clone()).with_chain_id(chain_id);
        let wallet_address = wallet.address();
        let signer = SignerMiddleware::new(provider, wallet);

        let nonce = signer
            .get_transaction_count(wallet_address, None)
            .await
            .map_err(classify_rpc_error)?;

        info!(chain_id, ?wallet_address, "connected");

        Ok(Self {
            signer: Arc::new(signer),
            nonce: AtomicU64::new(nonce.as_u64()),
            gas_limit: profile.gas_limit.map(|g| g.0),
            gas_price: profile.gas_price.map(|g| g.0),
        })
    }

    fn next_nonce(&self) -> U256 {
        U256::from(self.nonce.fetch_add(1, Ordering::SeqCst))
    }

    fn prepare(&self, tx: &mut TypedTransaction) {
        tx.set_nonce(self.next_nonce());

        if let Some(gas) = self.gas_limit {
            tx.set_gas(gas);
        }

        if let Some(price) = self.gas_price {
            tx.set_gas_price(price);
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    #[instrument(skip_all, fields(contract = %artifact.contract_name))]
    async fn deploy_contract(
        &self,
        artifact: &ContractArtifact,
        args: Vec<Token>,
    ) -> Result<Deployed, DeployError> {
        let factory = ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode.clone(),
            self.signer.clone(),
        );

        let mut deployer = factory
            .deploy_tokens(args)
            .map_err(|e| DeployError::InvalidArguments(e.to_string()))?;
        self.prepare(&mut deployer.tx);

        let (contract, receipt) = deployer
            .send_with_receipt()
            .await
            .map_err(classify_rpc_error)?;

        info!(address = ?contract.address(), "contract deployed");

        Ok(Deployed {
            address: contract.address(),
            transaction_hash: Some(receipt.transaction_hash),
        })
    }

    async fn deploy_proxy_with_initializer(
        &self,
        logic: &ContractArtifact,
        proxy: &ContractArtifact,
        init: InitCall,
    ) -> Result<Deployed, DeployError> {
        let logic_deployment = self.deploy_contract(logic, vec![]).await?;

        let init_fn = logic.abi.function(&init.function).map_err(|e| {
            DeployError::InvalidArguments(format!(
                "`{}` has no `{}` function: {e}",
                logic.contract_name, init.function
            ))
        })?;
        let init_data = init_fn
            .encode_input(&init.args)
            .map_err(|e| DeployError::InvalidArguments(e.to_string()))?;

        // The initializer call is baked into the proxy's constructor, so
        // deployment and initialization land in one transaction.
        let proxy_deployment = self
            .deploy_contract(
                proxy,
                vec![
                    Token::Address(logic_deployment.address),
                    Token::Bytes(init_data),
                ],
            )
            .await?;

        info!(
            logic = ?logic_deployment.address,
            proxy = ?proxy_deployment.address,
            "proxy deployed and initialized"
        );

        Ok(proxy_deployment)
    }

    #[instrument(skip_all, fields(proxy = ?proxy))]
    async fn upgrade_implementation(
        &self,
        proxy: Address,
        new_logic: &ContractArtifact,
    ) -> Result<Deployed, DeployError> {
        let logic_deployment =
            self.deploy_contract(new_logic, vec![]).await?;

        let proxy_contract = Erc1967Proxy::new(proxy, self.signer.clone());
        let mut call = proxy_contract
            .upgrade_to_and_call(logic_deployment.address, Bytes::default());
        self.prepare(&mut call.tx);

        let pending = call.send().await.map_err(classify_rpc_error)?;
        let receipt = pending
            .await
            .map_err(classify_rpc_error)?
            .ok_or_else(|| {
                DeployError::ChainCallFailed(
                    "upgrade transaction dropped from the mempool".to_string(),
                )
            })?;

        if receipt.status != Some(1.into()) {
            return Err(DeployError::ChainCallFailed(
                "upgrade transaction reverted".to_string(),
            ));
        }

        info!(implementation = ?logic_deployment.address, "proxy repointed");

        Ok(Deployed {
            address: proxy,
            transaction_hash: Some(receipt.transaction_hash),
        })
    }

    async fn implementation_of(
        &self,
        proxy: Address,
    ) -> Result<Option<Address>, DeployError> {
        let slot = H256::from(EIP1967_IMPLEMENTATION_SLOT);

        let raw = self
            .signer
            .get_storage_at(proxy, slot, None)
            .await
            .map_err(classify_rpc_error)?;

        let implementation = Address::from_slice(&raw.as_bytes()[12..]);

        Ok((!implementation.is_zero()).then_some(implementation))
    }

    async fn erc20_metadata(
        &self,
        address: Address,
    ) -> Result<Option<(String, String)>, DeployError> {
        let token = Erc20Metadata::new(address, self.signer.clone());

        let name = token.name().call().await;
        let symbol = token.symbol().call().await;

        match (name, symbol) {
            (Ok(name), Ok(symbol)) => Ok(Some((name, symbol))),
            _ => Ok(None),
        }
    }
}

/// RPC errors arrive as strings, so taxonomy mapping is by message. The
/// revert reason, when there is one, is passed through untouched.
fn classify_rpc_error<E: std::fmt::Display>(err: E) -> DeployError {
    let message = err.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("error sending request")
        || lowered.contains("connection refused")
        || lowered.contains("connection reset")
        || lowered.contains("timed out")
        || lowered.contains("dns error")
    {
        DeployError::NetworkUnreachable(message)
    } else if lowered.contains("insufficient funds")
        || lowered.contains("invalid sender")
        || lowered.contains("unauthorized")
    {
        DeployError::CredentialRejected(message)
    } else {
        DeployError::ChainCallFailed(message)
    }
}
