//! InMemory CredentialStore 実装

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Credential, CredentialStore, StoreError};

/// インメモリ CredentialStore 実装
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.credential.lock().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.credential.lock().await = Some(credential.clone());
        tracing::debug!("Credential stored in memory");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.credential.lock().await = None;
        tracing::debug!("Credential cleared from memory");
        Ok(())
    }
}
