use ethers::types::Address;

/// Every way a deployment invocation can fail.
///
/// Configuration errors (`UnknownNetwork`, `DuplicateNetwork`,
/// `InvalidProfile`, `InvalidArguments`) fail fast before anything touches
/// the chain. Environment errors (`NetworkUnreachable`,
/// `CredentialRejected`) are surfaced for operator intervention. Procedural
/// errors (`ProxyNotFound`, `UpgradeIncompatible`) abort before any
/// transaction is submitted. `ChainCallFailed` wraps a revert with the
/// underlying reason untouched.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    #[error("network `{0}` is already registered")]
    DuplicateNetwork(String),

    #[error("network profile `{name}` is unusable: {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("failed to load artifact `{name}`: {source}")]
    ArtifactUnavailable {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("signing credential rejected: {0}")]
    CredentialRejected(String),

    #[error("no upgradeable proxy found at {0:?}")]
    ProxyNotFound(Address),

    #[error("storage layout incompatible: {0}")]
    UpgradeIncompatible(String),

    #[error("chain call failed: {0}")]
    ChainCallFailed(String),
}

impl DeployError {
    /// Whether the failure happened after a transaction was handed to the
    /// chain. Used to distinguish a reverted procedure from one that never
    /// submitted anything.
    pub fn is_chain_failure(&self) -> bool {
        matches!(self, Self::ChainCallFailed(_))
    }
}
