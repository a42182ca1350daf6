//! Credential store trait 定義
//!
//! 認証情報の永続化インターフェース。具体的な実装は Infrastructure 層が提供します
//! （依存性の逆転）。

use async_trait::async_trait;

use super::{error::StoreError, model::Credential};

/// Credential Store Adapter
///
/// Sole owner of the access + refresh pair. Everything else reads through it,
/// so a refresh performed by the REST layer is visible to the next socket handshake.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, if any
    async fn load(&self) -> Result<Option<Credential>, StoreError>;

    /// Persist both halves of the credential together
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Remove everything (forces logout)
    async fn clear(&self) -> Result<(), StoreError>;

    /// Whether a credential is stored
    async fn has_credential(&self) -> bool {
        matches!(self.load().await, Ok(Some(_)))
    }
}
