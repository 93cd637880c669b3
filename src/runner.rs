use std::collections::HashMap;

use ethers::types::Address;
use tracing::{debug, info, instrument, warn};

use crate::chain::{ChainClient, Deployed, InitCall};
use crate::config::NetworkProfile;
use crate::contracts::{self, ArtifactStore, ContractId, PROXY_ARTIFACT};
use crate::error::DeployError;
use crate::layout;
use crate::types::{DeploymentRequest, DeploymentResult, ProcedureState};

/// Drives one deployment procedure to completion against a chain client.
///
/// The runner submits at most once per invocation; a failure anywhere
/// aborts the remaining steps and surfaces the originating error. Each
/// completed step is logged so a failure between steps is diagnosable
/// from the log alone.
pub struct Runner {
    artifacts: ArtifactStore,
}

impl Runner {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    #[instrument(skip_all, fields(
        network = %profile.name,
        contract = %request.contract(),
        kind = %request.kind(),
    ))]
    pub async fn run(
        &self,
        profile: &NetworkProfile,
        request: DeploymentRequest,
        client: &dyn ChainClient,
    ) -> Result<DeploymentResult, DeployError> {
        profile.ensure_usable()?;
        debug!(state = %ProcedureState::Pending, "procedure accepted");

        let kind = request.kind();

        let outcome = match request {
            DeploymentRequest::Fresh { contract, args } => {
                self.run_fresh(client, contract, &args).await
            }
            DeploymentRequest::Upgrade {
                contract,
                proxy,
                baseline,
            } => {
                self.run_upgrade(client, contract, proxy, baseline.as_deref())
                    .await
            }
        };

        let state = terminal_state(&outcome);
        match &outcome {
            Ok(deployed) => {
                info!(%state, address = ?deployed.address, "procedure finished");
            }
            Err(err) => {
                warn!(%state, %err, "procedure did not complete");
            }
        }

        let deployed = outcome?;

        Ok(DeploymentResult {
            address: deployed.address,
            transaction_hash: deployed.transaction_hash,
            kind,
        })
    }

    async fn run_fresh(
        &self,
        client: &dyn ChainClient,
        contract: ContractId,
        args: &HashMap<String, String>,
    ) -> Result<Deployed, DeployError> {
        let tokens = contracts::ordered_tokens(contract, args)?;
        let artifact = self.artifacts.load(&contract.artifact_name()).await?;

        if let Some(initializer) = contract.initializer() {
            let proxy_artifact = self.artifacts.load(PROXY_ARTIFACT).await?;

            debug!(state = %ProcedureState::Submitted, "deploying logic and initialized proxy");
            client
                .deploy_proxy_with_initializer(
                    &artifact,
                    &proxy_artifact,
                    InitCall {
                        function: initializer.to_string(),
                        args: tokens,
                    },
                )
                .await
        } else {
            debug!(state = %ProcedureState::Submitted, "deploying contract");
            let deployed = client.deploy_contract(&artifact, tokens).await?;

            if let Some((name, symbol)) =
                client.erc20_metadata(deployed.address).await?
            {
                info!(%name, %symbol, "token metadata");
            }

            Ok(deployed)
        }
    }

    async fn run_upgrade(
        &self,
        client: &dyn ChainClient,
        contract: ContractId,
        proxy: Address,
        baseline: Option<&str>,
    ) -> Result<Deployed, DeployError> {
        if !contract.is_upgradeable() {
            return Err(DeployError::InvalidArguments(format!(
                "`{contract}` is not an upgradeable contract"
            )));
        }

        let artifact = self.artifacts.load(&contract.artifact_name()).await?;

        if client.implementation_of(proxy).await?.is_none() {
            return Err(DeployError::ProxyNotFound(proxy));
        }
        info!("proxy recognized");

        // Both checks above and below are read-only. Nothing is submitted
        // until they pass.
        match baseline {
            Some(name) => {
                let previous = self.artifacts.load(name).await?;
                check_layouts(&previous, &artifact)?;
                info!(baseline = name, "storage layout verified");
            }
            None => {
                warn!("no baseline artifact given, skipping the storage layout check");
            }
        }

        debug!(state = %ProcedureState::Submitted, "deploying new logic and repointing proxy");
        client.upgrade_implementation(proxy, &artifact).await
    }
}

fn terminal_state(
    outcome: &Result<Deployed, DeployError>,
) -> ProcedureState {
    let state = match outcome {
        Ok(_) => ProcedureState::Confirmed,
        // ChainCallFailed means the chain saw the transaction and rejected
        // it; everything else failed before submission.
        Err(err) if err.is_chain_failure() => ProcedureState::Reverted,
        Err(_) => ProcedureState::Failed,
    };
    debug_assert!(state.is_terminal());
    state
}

fn check_layouts(
    previous: &contracts::ContractArtifact,
    next: &contracts::ContractArtifact,
) -> Result<(), DeployError> {
    match (&previous.storage_layout, &next.storage_layout) {
        (Some(old), Some(new)) => layout::ensure_compatible(old, new),
        (None, _) => Err(DeployError::UpgradeIncompatible(format!(
            "baseline artifact `{}` carries no storage layout",
            previous.contract_name
        ))),
        (_, None) => Err(DeployError::UpgradeIncompatible(format!(
            "artifact `{}` carries no storage layout",
            next.contract_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use ethers::abi::Token;
    use ethers::types::{Bytes, H256};
    use maplit::hashmap;
    use tokio::sync::Mutex;

    use super::*;
    use crate::contracts::ContractArtifact;
    use crate::layout::{StorageEntry, StorageLayout};
    use crate::types::DeploymentKind;

    struct MockProxy {
        implementation: Address,
        init_args: Vec<Token>,
        initialized: bool,
    }

    /// Simulated chain. Mints addresses from a counter, records every
    /// deployment and counts submitted transactions.
    #[derive(Default)]
    struct MockChain {
        unreachable: bool,
        transactions: AtomicU64,
        next_address: AtomicU64,
        contracts: Mutex<HashMap<Address, (String, Vec<Token>)>>,
        proxies: Mutex<HashMap<Address, MockProxy>>,
    }

    impl MockChain {
        fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Default::default()
            }
        }

        fn ensure_reachable(&self) -> Result<(), DeployError> {
            if self.unreachable {
                return Err(DeployError::NetworkUnreachable(
                    "connection refused".to_string(),
                ));
            }
            Ok(())
        }

        fn mint_address(&self) -> Address {
            let n = self.next_address.fetch_add(1, Ordering::SeqCst) + 1;
            Address::from_low_u64_be(n)
        }

        fn record_transaction(&self) -> H256 {
            let n = self.transactions.fetch_add(1, Ordering::SeqCst) + 1;
            H256::from_low_u64_be(n)
        }

        fn transaction_count(&self) -> u64 {
            self.transactions.load(Ordering::SeqCst)
        }

        /// Seeds a pre-existing, already initialized proxy.
        async fn add_proxy(&self, implementation: Address) -> Address {
            let address = self.mint_address();
            self.proxies.lock().await.insert(
                address,
                MockProxy {
                    implementation,
                    init_args: vec![],
                    initialized: true,
                },
            );
            address
        }

        /// What the chain answers when someone calls the initializer on a
        /// proxy that already ran it.
        async fn reinitialize(
            &self,
            proxy: Address,
        ) -> Result<(), DeployError> {
            let proxies = self.proxies.lock().await;
            let proxy = proxies.get(&proxy).expect("proxy not deployed");

            if proxy.initialized {
                return Err(DeployError::ChainCallFailed(
                    "execution reverted: Initializable: contract is already initialized"
                        .to_string(),
                ));
            }

            Ok(())
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn deploy_contract(
            &self,
            artifact: &ContractArtifact,
            args: Vec<Token>,
        ) -> Result<Deployed, DeployError> {
            self.ensure_reachable()?;

            let address = self.mint_address();
            self.contracts
                .lock()
                .await
                .insert(address, (artifact.contract_name.clone(), args));

            Ok(Deployed {
                address,
                transaction_hash: Some(self.record_transaction()),
            })
        }

        async fn deploy_proxy_with_initializer(
            &self,
            logic: &ContractArtifact,
            _proxy: &ContractArtifact,
            init: InitCall,
        ) -> Result<Deployed, DeployError> {
            self.ensure_reachable()?;

            let logic_deployment =
                self.deploy_contract(logic, vec![]).await?;

            let address = self.mint_address();
            self.proxies.lock().await.insert(
                address,
                MockProxy {
                    implementation: logic_deployment.address,
                    init_args: init.args,
                    initialized: true,
                },
            );

            Ok(Deployed {
                address,
                transaction_hash: Some(self.record_transaction()),
            })
        }

        async fn upgrade_implementation(
            &self,
            proxy: Address,
            new_logic: &ContractArtifact,
        ) -> Result<Deployed, DeployError> {
            self.ensure_reachable()?;

            let logic_deployment =
                self.deploy_contract(new_logic, vec![]).await?;

            let mut proxies = self.proxies.lock().await;
            let entry = proxies
                .get_mut(&proxy)
                .ok_or(DeployError::ProxyNotFound(proxy))?;
            entry.implementation = logic_deployment.address;

            Ok(Deployed {
                address: proxy,
                transaction_hash: Some(self.record_transaction()),
            })
        }

        async fn implementation_of(
            &self,
            proxy: Address,
        ) -> Result<Option<Address>, DeployError> {
            self.ensure_reachable()?;

            Ok(self
                .proxies
                .lock()
                .await
                .get(&proxy)
                .map(|p| p.implementation))
        }

        async fn erc20_metadata(
            &self,
            address: Address,
        ) -> Result<Option<(String, String)>, DeployError> {
            self.ensure_reachable()?;

            let contracts = self.contracts.lock().await;
            let Some((name, args)) = contracts.get(&address) else {
                return Ok(None);
            };

            if name != "DLP" {
                return Ok(None);
            }

            match args.as_slice() {
                [Token::String(name), Token::String(symbol)] => {
                    Ok(Some((name.clone(), symbol.clone())))
                }
                _ => Ok(None),
            }
        }
    }

    fn artifact(name: &str) -> ContractArtifact {
        ContractArtifact {
            contract_name: name.to_string(),
            abi: ethers::abi::Abi::default(),
            bytecode: Bytes::from(vec![0x60, 0x80]),
            storage_layout: None,
        }
    }

    fn artifact_with_layout(
        name: &str,
        vars: &[(&str, &str, &str)],
    ) -> ContractArtifact {
        let mut artifact = artifact(name);
        artifact.storage_layout = Some(StorageLayout {
            storage: vars
                .iter()
                .map(|(label, slot, ty)| StorageEntry {
                    label: label.to_string(),
                    slot: slot.to_string(),
                    offset: 0,
                    ty: ty.to_string(),
                })
                .collect(),
        });
        artifact
    }

    fn store_with(artifacts: Vec<ContractArtifact>) -> ArtifactStore {
        let mut store = ArtifactStore::new("unused");
        for artifact in artifacts {
            store.insert(artifact);
        }
        store
    }

    fn profile() -> NetworkProfile {
        NetworkProfile {
            name: "testnet".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: None,
            credential: "PRIVATE_KEY".to_string(),
            gas_limit: None,
            gas_price: None,
        }
    }

    const TOKEN_ADDRESS: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn fresh_token_deploy_matches_arguments() {
        let chain = MockChain::default();
        let runner = Runner::new(store_with(vec![artifact("DLP")]));

        let request = DeploymentRequest::Fresh {
            contract: ContractId::Dlp,
            args: hashmap! {
                "name".to_string() =>
                    "Decentralized LaunchPool Token".to_string(),
                "symbol".to_string() => "DLP".to_string(),
            },
        };

        let result = runner.run(&profile(), request, &chain).await.unwrap();

        assert_eq!(result.kind, DeploymentKind::Fresh);
        assert_ne!(result.address, Address::zero());
        assert!(result.transaction_hash.is_some());

        let metadata =
            chain.erc20_metadata(result.address).await.unwrap();
        assert_eq!(
            metadata,
            Some((
                "Decentralized LaunchPool Token".to_string(),
                "DLP".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn farming_proxy_initializes_exactly_once() {
        let chain = MockChain::default();
        let runner = Runner::new(store_with(vec![
            artifact("DLPFarming"),
            artifact(PROXY_ARTIFACT),
        ]));

        let request = DeploymentRequest::Fresh {
            contract: ContractId::DlpFarming,
            args: hashmap! {
                "name".to_string() => "DLPFarming".to_string(),
                "admin".to_string() =>
                    "0x0000000000000000000000000000000000000000".to_string(),
                "token".to_string() => TOKEN_ADDRESS.to_string(),
                "status".to_string() => "true".to_string(),
            },
        };

        let result = runner.run(&profile(), request, &chain).await.unwrap();
        assert_eq!(result.kind, DeploymentKind::Fresh);

        {
            let proxies = chain.proxies.lock().await;
            let proxy = proxies.get(&result.address).unwrap();

            assert!(proxy.initialized);
            assert_eq!(
                proxy.init_args,
                vec![
                    Token::String("DLPFarming".to_string()),
                    Token::Address(Address::zero()),
                    Token::Address(
                        Address::from_str(TOKEN_ADDRESS).unwrap()
                    ),
                    Token::Bool(true),
                ]
            );
        }

        let err = chain.reinitialize(result.address).await.unwrap_err();
        match err {
            DeployError::ChainCallFailed(reason) => {
                assert!(reason.contains("already initialized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upgrade_repoints_a_recognized_proxy() {
        let chain = MockChain::default();
        let old_implementation = Address::repeat_byte(0x33);
        let proxy = chain.add_proxy(old_implementation).await;

        let runner = Runner::new(store_with(vec![
            artifact_with_layout(
                "DLPFarming",
                &[
                    ("token", "0", "t_address"),
                    ("status", "1", "t_bool"),
                    ("rewardRate", "2", "t_uint256"),
                ],
            ),
            artifact_with_layout(
                "DLPFarmingV1",
                &[("token", "0", "t_address"), ("status", "1", "t_bool")],
            ),
        ]));

        let request = DeploymentRequest::Upgrade {
            contract: ContractId::DlpFarming,
            proxy,
            baseline: Some("DLPFarmingV1".to_string()),
        };

        let result = runner.run(&profile(), request, &chain).await.unwrap();

        assert_eq!(result.kind, DeploymentKind::Upgrade);
        assert_eq!(result.address, proxy);

        let new_implementation =
            chain.implementation_of(proxy).await.unwrap().unwrap();
        assert_ne!(new_implementation, old_implementation);

        // One for the new logic contract, one for the repoint.
        assert_eq!(chain.transaction_count(), 2);
    }

    #[tokio::test]
    async fn upgrade_of_unknown_proxy_sends_nothing() {
        let chain = MockChain::default();
        let runner = Runner::new(store_with(vec![artifact("DLPFarming")]));

        let request = DeploymentRequest::Upgrade {
            contract: ContractId::DlpFarming,
            proxy: Address::repeat_byte(0xd4),
            baseline: None,
        };

        let err =
            runner.run(&profile(), request, &chain).await.unwrap_err();

        assert!(matches!(err, DeployError::ProxyNotFound(_)));
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn incompatible_layout_aborts_before_submission() {
        let chain = MockChain::default();
        let proxy = chain.add_proxy(Address::repeat_byte(0x33)).await;

        // The new artifact reorders the baseline's variables.
        let runner = Runner::new(store_with(vec![
            artifact_with_layout(
                "DLPFarming",
                &[("status", "0", "t_bool"), ("token", "1", "t_address")],
            ),
            artifact_with_layout(
                "DLPFarmingV1",
                &[("token", "0", "t_address"), ("status", "1", "t_bool")],
            ),
        ]));

        let request = DeploymentRequest::Upgrade {
            contract: ContractId::DlpFarming,
            proxy,
            baseline: Some("DLPFarmingV1".to_string()),
        };

        let err =
            runner.run(&profile(), request, &chain).await.unwrap_err();

        assert!(matches!(err, DeployError::UpgradeIncompatible(_)));
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_network_fails_without_side_effects() {
        let chain = MockChain::unreachable();
        let runner = Runner::new(store_with(vec![artifact("DLP")]));

        let request = DeploymentRequest::Fresh {
            contract: ContractId::Dlp,
            args: hashmap! {
                "name".to_string() =>
                    "Decentralized LaunchPool Token".to_string(),
                "symbol".to_string() => "DLP".to_string(),
            },
        };

        let err =
            runner.run(&profile(), request, &chain).await.unwrap_err();

        assert!(matches!(err, DeployError::NetworkUnreachable(_)));
        assert_eq!(chain.transaction_count(), 0);
        assert!(chain.contracts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn plain_contract_cannot_be_upgraded() {
        let chain = MockChain::default();
        let runner = Runner::new(store_with(vec![artifact("DLP")]));

        let request = DeploymentRequest::Upgrade {
            contract: ContractId::Dlp,
            proxy: Address::repeat_byte(0x44),
            baseline: None,
        };

        let err =
            runner.run(&profile(), request, &chain).await.unwrap_err();

        assert!(matches!(err, DeployError::InvalidArguments(_)));
        assert_eq!(chain.transaction_count(), 0);
    }

    #[tokio::test]
    async fn unusable_profile_fails_before_anything_else() {
        let chain = MockChain::default();
        let runner = Runner::new(store_with(vec![artifact("DLP")]));

        let mut broken = profile();
        broken.credential = String::new();

        let request = DeploymentRequest::Fresh {
            contract: ContractId::Dlp,
            args: HashMap::new(),
        };

        let err = runner.run(&broken, request, &chain).await.unwrap_err();

        assert!(matches!(err, DeployError::InvalidProfile { .. }));
        assert_eq!(chain.transaction_count(), 0);
    }
}
