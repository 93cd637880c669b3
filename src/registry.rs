use std::collections::HashMap;

use crate::config::NetworkProfile;
use crate::error::DeployError;

/// In-memory mapping from network name to connection profile. Populated
/// once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    profiles: HashMap<String, NetworkProfile>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        profile: NetworkProfile,
    ) -> Result<(), DeployError> {
        if self.profiles.contains_key(&profile.name) {
            return Err(DeployError::DuplicateNetwork(profile.name));
        }

        self.profiles.insert(profile.name.clone(), profile);

        Ok(())
    }

    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<&NetworkProfile, DeployError> {
        self.profiles
            .get(name)
            .ok_or_else(|| DeployError::UnknownNetwork(name.to_string()))
    }
}
