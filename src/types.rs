use std::collections::HashMap;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;

use crate::contracts::ContractId;

macro_rules! impl_primitive_num {
    (pub struct $outer:ident($tname:ty)) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Serialize,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Deserialize,
            Shrinkwrap,
        )]
        pub struct $outer(pub $tname);

        impl std::fmt::Display for $outer {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

impl_primitive_num!(pub struct ChainId(u64));
impl_primitive_num!(pub struct GasLimit(u64));
impl_primitive_num!(pub struct GasPrice(u64));

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
pub enum DeploymentKind {
    #[display(fmt = "fresh")]
    Fresh,
    #[display(fmt = "upgrade")]
    Upgrade,
}

/// A single deployment procedure, constructed per invocation from
/// caller-supplied arguments and discarded after use.
#[derive(Debug, Clone)]
pub enum DeploymentRequest {
    /// Deploy a new instance. Plain contracts get their constructor called,
    /// upgradeable ones get a proxy whose initializer runs exactly once,
    /// atomically with proxy deployment.
    Fresh {
        contract: ContractId,
        args: HashMap<String, String>,
    },
    /// Repoint an existing proxy at a freshly deployed implementation.
    ///
    /// `baseline` names the artifact of the currently deployed
    /// implementation; when present its storage layout is checked against
    /// the new artifact before anything is submitted.
    Upgrade {
        contract: ContractId,
        proxy: Address,
        baseline: Option<String>,
    },
}

impl DeploymentRequest {
    pub fn kind(&self) -> DeploymentKind {
        match self {
            Self::Fresh { .. } => DeploymentKind::Fresh,
            Self::Upgrade { .. } => DeploymentKind::Upgrade,
        }
    }

    pub fn contract(&self) -> ContractId {
        match self {
            Self::Fresh { contract, .. } => *contract,
            Self::Upgrade { contract, .. } => *contract,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentResult {
    pub address: Address,
    pub transaction_hash: Option<H256>,
    pub kind: DeploymentKind,
}

/// Per-invocation lifecycle. Confirmed, Reverted and Failed are terminal;
/// a submitted transaction cannot be withdrawn, so there is no transition
/// out of Submitted other than the chain deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ProcedureState {
    #[display(fmt = "pending")]
    Pending,
    #[display(fmt = "submitted")]
    Submitted,
    #[display(fmt = "confirmed")]
    Confirmed,
    #[display(fmt = "reverted")]
    Reverted,
    #[display(fmt = "failed")]
    Failed,
}

impl ProcedureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Reverted | Self::Failed)
    }
}
