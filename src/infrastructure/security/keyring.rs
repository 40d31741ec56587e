use crate::domain::error::{AppError, Result};
use keyring::Entry;

/// OS keychain lookups for secrets referenced as `keychain:<name>` in config.
pub struct KeyringManager {
    service: String,
}

impl KeyringManager {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<String> {
        let entry = Entry::new(&self.service, key).map_err(|e| {
            AppError::ConfigError(format!("Failed to access keychain entry '{}': {}", key, e))
        })?;

        entry.get_password().map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read secret '{}' from keychain: {}",
                key, e
            ))
        })
    }
}
