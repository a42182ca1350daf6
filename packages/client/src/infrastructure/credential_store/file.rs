//! File-backed CredentialStore 実装
//!
//! Stores the pair as `{"accessToken", "refreshToken"}` JSON. Writes go to a
//! sibling temp file first and are renamed into place, so a crash never leaves
//! half a credential behind.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{
    domain::{Credential, CredentialStore, StoreError},
    infrastructure::dto::http::TokenPairDto,
};

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        let dto: TokenPairDto =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        let credential =
            Credential::try_from(dto).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let dto = TokenPairDto {
            access_token: credential.access_token.as_str().to_string(),
            refresh_token: credential.refresh_token.as_str().to_string(),
        };
        let json = serde_json::to_vec_pretty(&dto).map_err(|e| StoreError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tracing::debug!("Credential written to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Credential file {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}
