use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Storage layout section of a build artifact, as emitted by the compiler
/// when layout output is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub label: String,
    pub slot: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Checks that `new` can safely replace `old` behind a proxy: every
/// previously declared variable must keep its label, slot, offset and type.
/// Appending new variables after the existing ones is allowed.
pub fn ensure_compatible(
    old: &StorageLayout,
    new: &StorageLayout,
) -> Result<(), DeployError> {
    if new.storage.len() < old.storage.len() {
        return Err(DeployError::UpgradeIncompatible(format!(
            "{} storage variable(s) removed",
            old.storage.len() - new.storage.len()
        )));
    }

    for (prev, next) in old.storage.iter().zip(&new.storage) {
        if prev != next {
            return Err(DeployError::UpgradeIncompatible(format!(
                "`{}` at slot {} became `{}` at slot {}",
                prev.label, prev.slot, next.label, next.slot
            )));
        }
    }

    Ok(())
}
