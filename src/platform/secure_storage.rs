use std::collections::HashMap;

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const CREDENTIAL_SERVICE: &str = "app.healthchat.credentials";
const BACKEND_TOKEN_KEY: &str = "backend_token";

#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn store(&self, service: &str, key: &str, value: &str) -> Result<()>;
    async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>>;
    async fn delete(&self, service: &str, key: &str) -> Result<()>;
}

/// Holds the bearer token sent with every chat request.
pub struct CredentialStore {
    backend: Box<dyn SecureStorage>,
}

impl CredentialStore {
    /// Store backed by the OS keyring.
    pub fn new() -> Self {
        Self::with_backend(Box::new(KeyringStorage))
    }

    pub fn with_backend(backend: Box<dyn SecureStorage>) -> Self {
        Self { backend }
    }

    pub async fn store_token(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::validation("Token must not be empty"));
        }

        let result = self.backend.store(CREDENTIAL_SERVICE, BACKEND_TOKEN_KEY, token).await;
        self.log_access("store", result.is_ok());
        result
    }

    pub async fn retrieve_token(&self) -> Result<Option<String>> {
        let result = self.backend.retrieve(CREDENTIAL_SERVICE, BACKEND_TOKEN_KEY).await;

        match &result {
            Ok(Some(_)) => debug!("Backend token found in secure storage"),
            Ok(None) => debug!("No backend token in secure storage"),
            Err(_) => {}
        }
        self.log_access("retrieve", result.is_ok());

        result
    }

    pub async fn delete_token(&self) -> Result<()> {
        let result = self.backend.delete(CREDENTIAL_SERVICE, BACKEND_TOKEN_KEY).await;
        self.log_access("delete", result.is_ok());
        result
    }

    fn log_access(&self, operation: &str, success: bool) {
        if success {
            debug!("Audit: {} backend token succeeded", operation);
        } else {
            warn!("Audit: {} backend token failed", operation);
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyringStorage;

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let entry = Entry::new(service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>> {
        let entry = Entry::new(service, key)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::SecureStorage(e)),
        }
    }

    async fn delete(&self, service: &str, key: &str) -> Result<()> {
        let entry = Entry::new(service, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(Error::SecureStorage(e)),
        }
    }
}

/// Process-local storage for tests and keyring-less environments.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(service.to_string(), key.to_string())).cloned())
    }

    async fn delete(&self, service: &str, key: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}
