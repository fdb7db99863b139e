//! Credential lookup for unattended runs
//!
//! Profile passwords are looked up under `profile_password_<name>`. The
//! environment store maps a key to `TERMBACKUP_<KEY>` (upper-cased) and lets
//! values set in-process take precedence.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::crypto::Password;
use crate::error::{BackupError, BackupResult};

const PASSWORD_PREFIX: &str = "profile_password_";
const ENV_PREFIX: &str = "TERMBACKUP_";

/// Key under which a profile's backup password is stored
pub fn profile_password_key(profile: &str) -> String {
    format!("{}{}", PASSWORD_PREFIX, profile)
}

/// Secret storage collaborator
pub trait CredentialStore: Send + Sync {
    fn get_password(&self, key: &str) -> BackupResult<Option<Password>>;

    fn set_password(&self, key: &str, value: &Password) -> BackupResult<()>;
}

/// Environment-backed store with an in-process override map
#[derive(Debug, Default)]
pub struct EnvCredentialStore {
    overrides: RwLock<HashMap<String, Password>>,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variable consulted for `key`
    pub fn env_var(key: &str) -> String {
        format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_password(&self, key: &str) -> BackupResult<Option<Password>> {
        let overrides = self
            .overrides
            .read()
            .map_err(|_| BackupError::Config("Credential store lock poisoned".into()))?;
        if let Some(value) = overrides.get(key) {
            return Ok(Some(value.clone()));
        }

        match std::env::var(Self::env_var(key)) {
            Ok(value) if !value.is_empty() => Ok(Some(Password::new(value))),
            _ => Ok(None),
        }
    }

    fn set_password(&self, key: &str, value: &Password) -> BackupResult<()> {
        self.overrides
            .write()
            .map_err(|_| BackupError::Config("Credential store lock poisoned".into()))?
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_password_key() {
        assert_eq!(profile_password_key("docs"), "profile_password_docs");
        assert_eq!(
            EnvCredentialStore::env_var(&profile_password_key("docs")),
            "TERMBACKUP_PROFILE_PASSWORD_DOCS"
        );
    }

    #[test]
    fn test_override_then_env() {
        let store = EnvCredentialStore::new();
        let key = profile_password_key("credtest_unique");
        assert!(store.get_password(&key).unwrap().is_none());

        std::env::set_var(EnvCredentialStore::env_var(&key), "from-env");
        assert_eq!(store.get_password(&key).unwrap().unwrap().as_str(), "from-env");

        store.set_password(&key, &Password::new("override")).unwrap();
        assert_eq!(store.get_password(&key).unwrap().unwrap().as_str(), "override");
        std::env::remove_var(EnvCredentialStore::env_var(&key));
    }
}
