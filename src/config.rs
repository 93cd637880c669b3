use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::args::PrivateKey;
use crate::error::DeployError;
use crate::registry::NetworkRegistry;
use crate::types::{ChainId, GasLimit, GasPrice};

/// Deployment configuration file. Read once at startup, never mutated.
///
/// ```yaml
/// networks:
///   vanar:
///     rpc_url: https://rpc.vanarchain.com
///     chain_id: 2040
///     credential: PRIVATE_KEY
///     gas_limit: 5000000
/// etherscan_api_key: ...
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: BTreeMap<String, NetworkProfile>,

    /// Verification-service key. Parsed and carried so existing config
    /// files keep working, but no verification is performed by this tool.
    #[serde(default)]
    pub etherscan_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Filled in from the map key when the registry is built.
    #[serde(default, skip_serializing)]
    pub name: String,

    pub rpc_url: String,

    #[serde(default)]
    pub chain_id: Option<ChainId>,

    /// Name of the environment variable holding the signing key. The key
    /// itself is only resolved immediately before a network call.
    pub credential: String,

    #[serde(default)]
    pub gas_limit: Option<GasLimit>,

    #[serde(default)]
    pub gas_price: Option<GasPrice>,
}

impl NetworkProfile {
    /// A profile may be registered half-filled, but it must be complete by
    /// the time it backs an actual network call.
    pub fn ensure_usable(&self) -> Result<(), DeployError> {
        if self.rpc_url.trim().is_empty() {
            return Err(DeployError::InvalidProfile {
                name: self.name.clone(),
                reason: "rpc_url is empty".to_string(),
            });
        }

        if self.credential.trim().is_empty() {
            return Err(DeployError::InvalidProfile {
                name: self.name.clone(),
                reason: "credential is empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn resolve_credential(&self) -> Result<PrivateKey, DeployError> {
        let raw = std::env::var(&self.credential).map_err(|_| {
            DeployError::CredentialRejected(format!(
                "environment variable `{}` is not set",
                self.credential
            ))
        })?;

        raw.parse().map_err(|e| {
            DeployError::CredentialRejected(format!(
                "`{}` does not hold a valid key: {e}",
                self.credential
            ))
        })
    }
}

impl Config {
    pub fn registry(&self) -> Result<NetworkRegistry, DeployError> {
        let mut registry = NetworkRegistry::new();

        for (name, profile) in &self.networks {
            let mut profile = profile.clone();
            profile.name = name.clone();
            registry.register(profile)?;
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        networks:
          vanar:
            rpc_url: https://rpc.vanarchain.com
            chain_id: 2040
            credential: PRIVATE_KEY
            gas_limit: 5000000
          testnet:
            rpc_url: https://rpc.bimtvi.com
            chain_id: 1947
            credential: PRIVATE_KEY
            gas_limit: 5000000
            gas_price: 8000000000
        etherscan_api_key: some-key
    "#};

    #[test]
    fn parses_network_table() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();

        assert_eq!(config.networks.len(), 2);
        assert_eq!(config.etherscan_api_key.as_deref(), Some("some-key"));

        let vanar = &config.networks["vanar"];
        assert_eq!(vanar.rpc_url, "https://rpc.vanarchain.com");
        assert_eq!(vanar.chain_id, Some(ChainId(2040)));
        assert_eq!(vanar.credential, "PRIVATE_KEY");
        assert_eq!(vanar.gas_limit, Some(GasLimit(5_000_000)));
        assert_eq!(vanar.gas_price, None);

        let testnet = &config.networks["testnet"];
        assert_eq!(testnet.gas_price, Some(GasPrice(8_000_000_000)));
    }

    #[test]
    fn registry_carries_names_over() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let registry = config.registry().unwrap();

        let vanar = registry.resolve("vanar").unwrap();
        assert_eq!(vanar.name, "vanar");
    }

    #[test]
    fn incomplete_profile_is_unusable() {
        let profile = NetworkProfile {
            name: "broken".to_string(),
            rpc_url: String::new(),
            chain_id: None,
            credential: "PRIVATE_KEY".to_string(),
            gas_limit: None,
            gas_price: None,
        };

        let err = profile.ensure_usable().unwrap_err();
        assert!(matches!(err, DeployError::InvalidProfile { .. }));

        let profile = NetworkProfile {
            rpc_url: "https://rpc.bimtvi.com".to_string(),
            credential: "  ".to_string(),
            ..profile
        };

        let err = profile.ensure_usable().unwrap_err();
        assert!(matches!(err, DeployError::InvalidProfile { .. }));
    }

    #[test]
    fn missing_credential_env_var_is_rejected() {
        let profile = NetworkProfile {
            name: "testnet".to_string(),
            rpc_url: "https://rpc.bimtvi.com".to_string(),
            chain_id: None,
            credential: "DLP_DEPLOYER_TEST_UNSET_VAR".to_string(),
            gas_limit: None,
            gas_price: None,
        };

        let err = profile.resolve_credential().unwrap_err();
        assert!(matches!(err, DeployError::CredentialRejected(_)));
    }
}
