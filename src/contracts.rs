use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::layout::StorageLayout;

/// Artifact name of the proxy contract deployed in front of every
/// upgradeable implementation.
pub const PROXY_ARTIFACT: &str = "ERC1967Proxy";

/// The contracts this tool knows how to deploy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
)]
pub enum ContractId {
    #[strum(serialize = "DLP")]
    Dlp,
    #[strum(serialize = "DLPFarming")]
    DlpFarming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Address,
    Bool,
    Uint,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn param(name: &'static str, kind: ParamKind) -> Param {
    Param { name, kind }
}

impl ContractId {
    /// Name of the one-shot setup function for upgradeable contracts, None
    /// for contracts deployed plainly with a constructor.
    pub fn initializer(self) -> Option<&'static str> {
        match self {
            Self::Dlp => None,
            Self::DlpFarming => Some("initialize"),
        }
    }

    pub fn is_upgradeable(self) -> bool {
        self.initializer().is_some()
    }

    pub fn artifact_name(self) -> String {
        self.to_string()
    }

    /// Constructor/initializer parameters in the exact order the contract
    /// expects them.
    pub fn params(self) -> &'static [Param] {
        const DLP: &[Param] = &[
            param("name", ParamKind::Str),
            param("symbol", ParamKind::Str),
        ];
        const DLP_FARMING: &[Param] = &[
            param("name", ParamKind::Str),
            param("admin", ParamKind::Address),
            param("token", ParamKind::Address),
            param("status", ParamKind::Bool),
        ];
        match self {
            Self::Dlp => DLP,
            Self::DlpFarming => DLP_FARMING,
        }
    }
}

/// Orders a name → value mapping into the token sequence the contract's
/// constructor or initializer expects. Every declared parameter must be
/// supplied and nothing extra is accepted.
pub fn ordered_tokens(
    contract: ContractId,
    values: &HashMap<String, String>,
) -> Result<Vec<Token>, DeployError> {
    let params = contract.params();

    for name in values.keys() {
        if !params.iter().any(|p| p.name == name) {
            return Err(DeployError::InvalidArguments(format!(
                "`{contract}` has no parameter named `{name}`"
            )));
        }
    }

    params
        .iter()
        .map(|p| {
            let value = values.get(p.name).ok_or_else(|| {
                DeployError::InvalidArguments(format!(
                    "missing parameter `{}` for `{contract}`",
                    p.name
                ))
            })?;
            tokenize(p, value)
        })
        .collect()
}

fn tokenize(param: &Param, value: &str) -> Result<Token, DeployError> {
    let invalid = |detail: String| DeployError::InvalidArguments(detail);

    match param.kind {
        ParamKind::Str => Ok(Token::String(value.to_string())),
        ParamKind::Address => {
            let address = Address::from_str(value).map_err(|e| {
                invalid(format!("`{}` is not an address ({e})", param.name))
            })?;
            Ok(Token::Address(address))
        }
        ParamKind::Bool => {
            let flag = value.parse::<bool>().map_err(|e| {
                invalid(format!("`{}` is not a bool ({e})", param.name))
            })?;
            Ok(Token::Bool(flag))
        }
        ParamKind::Uint => {
            let number = U256::from_dec_str(value).map_err(|e| {
                invalid(format!("`{}` is not an integer ({e})", param.name))
            })?;
            Ok(Token::Uint(number))
        }
    }
}

/// A compiled contract as emitted by the build pipeline, one JSON file per
/// contract. The storage layout section is only present when the compiler
/// was asked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: ethers::abi::Abi,
    pub bytecode: Bytes,
    #[serde(default)]
    pub storage_layout: Option<StorageLayout>,
}

impl ContractArtifact {
    pub async fn read(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let artifact = serde_json::from_str(&content)?;
        Ok(artifact)
    }
}

/// Looks up artifacts by contract name under a single directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    overrides: HashMap<String, ContractArtifact>,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            overrides: HashMap::new(),
        }
    }

    /// Registers an artifact that shadows whatever is on disk.
    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.overrides
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub async fn load(
        &self,
        name: &str,
    ) -> Result<ContractArtifact, DeployError> {
        if let Some(artifact) = self.overrides.get(name) {
            return Ok(artifact.clone());
        }

        let path = self.root.join(format!("{name}.json"));

        ContractArtifact::read(&path).await.map_err(|e| {
            DeployError::ArtifactUnavailable {
                name: name.to_string(),
                source: e.into(),
            }
        })
    }
}
