//! UseCase: 認証情報のリフレッシュ
//!
//! Turns an expired access credential into a new one, at most once per failure
//! burst. The socket supervisor (on `AuthFailed`) and the REST client (on HTTP 401)
//! share one coordinator, so both observe the same outcome.
//!
//! The first caller creates the refresh future and parks a shared handle to it;
//! later callers attach to that handle. The slot is emptied once the flight lands.
//!
//! A flight that ends in `AuthExpired` is published once on [`subscribe_expired`],
//! whichever caller started it, so the session can end itself.
//!
//! [`subscribe_expired`]: AuthRefreshCoordinator::subscribe_expired

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, watch};

use crate::domain::{AccessToken, AuthApi, AuthError, CredentialStore, DeviceInfo};

type RefreshFlight = Shared<BoxFuture<'static, Result<AccessToken, AuthError>>>;

/// Auth Refresh Coordinator
pub struct AuthRefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    auth_api: Arc<dyn AuthApi>,
    device: DeviceInfo,
    /// In-flight refresh tagged with its generation
    in_flight: Mutex<Option<(u64, RefreshFlight)>>,
    generation: AtomicU64,
    /// Number of refresh flights that ended in `AuthExpired`
    expired: watch::Sender<u64>,
}

impl AuthRefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        auth_api: Arc<dyn AuthApi>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            store,
            auth_api,
            device,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            expired: watch::channel(0).0,
        }
    }

    /// Ticks once per refresh flight that ended in `AuthExpired`.
    pub fn subscribe_expired(&self) -> watch::Receiver<u64> {
        self.expired.subscribe()
    }

    /// Obtain a fresh access token.
    ///
    /// # Returns
    ///
    /// * `Ok(AccessToken)` - the new access token, already persisted
    /// * `Err(AuthError::AuthExpired)` - no refresh credential, or the backend refused it;
    ///   stored credentials have been cleared and the caller must log out
    pub async fn refresh(&self) -> Result<AccessToken, AuthError> {
        let (generation, flight) = self.join_or_start().await;
        let result = flight.await;
        if self.land(generation).await && result == Err(AuthError::AuthExpired) {
            tracing::warn!("Refresh #{} failed, credential is gone", generation);
            self.expired.send_modify(|count| *count += 1);
        }
        result
    }

    /// Whether a refresh is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    async fn join_or_start(&self) -> (u64, RefreshFlight) {
        let mut slot = self.in_flight.lock().await;
        if let Some((generation, flight)) = slot.as_ref() {
            tracing::debug!("Refresh #{} already in flight, waiting on it", generation);
            return (*generation, flight.clone());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Starting credential refresh #{}", generation);
        let flight = Self::run(
            self.store.clone(),
            self.auth_api.clone(),
            self.device.clone(),
        )
        .boxed()
        .shared();
        *slot = Some((generation, flight.clone()));
        (generation, flight)
    }

    /// Empty the slot if it still holds `generation`. Only the first waiter to
    /// land gets `true`.
    async fn land(&self, generation: u64) -> bool {
        let mut slot = self.in_flight.lock().await;
        if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            *slot = None;
            return true;
        }
        false
    }

    async fn run(
        store: Arc<dyn CredentialStore>,
        auth_api: Arc<dyn AuthApi>,
        device: DeviceInfo,
    ) -> Result<AccessToken, AuthError> {
        let Some(credential) = store.load().await? else {
            tracing::warn!("No refresh credential stored, session must sign in again");
            return Err(AuthError::AuthExpired);
        };

        match auth_api.refresh(&credential.refresh_token, &device).await {
            Ok(renewed) => {
                store.save(&renewed).await?;
                tracing::info!("Access credential refreshed");
                Ok(renewed.access_token)
            }
            Err(e) => {
                tracing::warn!("Credential refresh rejected: {}", e);
                if let Err(clear_err) = store.clear().await {
                    tracing::error!("Failed to clear credentials after refresh failure: {}", clear_err);
                }
                Err(AuthError::AuthExpired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ApiError, Credential, MockAuthApi, RefreshToken},
        infrastructure::credential_store::InMemoryCredentialStore,
        testing::{GatedAuthApi, credential},
    };
    use futures_util::future::join_all;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 同時に発生したリフレッシュ要求が 1 回の REST 呼び出しにまとめられること
    // - リフレッシュトークンが無い場合は即座に AuthExpired になること
    // - リフレッシュ失敗時に保存済みの認証情報が消去されること
    // - リフレッシュ失敗がセッション終了用に通知されること
    // - 完了後の新しい要求は新しいリフレッシュを開始すること
    // ========================================

    fn device() -> DeviceInfo {
        DeviceInfo {
            user_agent: "QureClinics-Mobile-App".to_string(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        // テスト項目: N 個の同時リフレッシュ要求で REST 呼び出しは 1 回だけ
        // given (前提条件):
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential(
            "stale", "refresh-1",
        )));
        let api = Arc::new(GatedAuthApi::new(credential("fresh", "refresh-2")));
        let coordinator = Arc::new(AuthRefreshCoordinator::new(
            store.clone(),
            api.clone(),
            device(),
        ));

        // when (操作):
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();
        api.wait_for_calls(1).await;
        // let every caller attach before the backend answers
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        api.release();
        let results = join_all(callers).await;

        // then (期待する結果):
        assert_eq!(api.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap().as_str(), "fresh");
        }
        let stored = store.load().await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_str(), "refresh-2");
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn test_missing_refresh_credential_fails_immediately() {
        // テスト項目: リフレッシュトークンが無い場合は REST を呼ばずに AuthExpired
        // given (前提条件):
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut api = MockAuthApi::new();
        api.expect_refresh().never();
        let coordinator = AuthRefreshCoordinator::new(store, Arc::new(api), device());

        // when (操作):
        let result = coordinator.refresh().await;

        // then (期待する結果):
        assert_eq!(result, Err(AuthError::AuthExpired));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_credentials() {
        // テスト項目: リフレッシュが拒否された場合は認証情報が消去される
        // given (前提条件):
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential(
            "stale", "revoked",
        )));
        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_, _| Err(ApiError::Unauthorized));
        let coordinator = AuthRefreshCoordinator::new(store.clone(), Arc::new(api), device());

        // when (操作):
        let result = coordinator.refresh().await;

        // then (期待する結果):
        assert_eq!(result, Err(AuthError::AuthExpired));
        assert!(!store.has_credential().await);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_published_once() {
        // テスト項目: リフレッシュ失敗は呼び出し元に関わらず 1 回だけ通知され、成功は通知されない
        // given (前提条件):
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential(
            "stale", "refresh-1",
        )));
        let mut api = MockAuthApi::new();
        let mut answers = vec![Err(ApiError::Unauthorized), Ok(credential("fresh", "refresh-2"))];
        api.expect_refresh()
            .times(2)
            .returning(move |_, _| answers.pop().unwrap());
        let coordinator = AuthRefreshCoordinator::new(store.clone(), Arc::new(api), device());
        let mut expired = coordinator.subscribe_expired();

        // when (操作):
        let renewed = coordinator.refresh().await;
        let renewed_changed = expired.has_changed().unwrap();
        let rejected = coordinator.refresh().await;

        // then (期待する結果):
        assert_eq!(renewed.unwrap().as_str(), "fresh");
        assert!(!renewed_changed);
        assert_eq!(rejected, Err(AuthError::AuthExpired));
        assert!(expired.has_changed().unwrap());
        assert_eq!(*expired.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_sequential_refreshes_start_new_flights() {
        // テスト項目: 前回のリフレッシュ完了後の要求は新たに REST を呼ぶ
        // given (前提条件):
        let store = Arc::new(InMemoryCredentialStore::with_credential(credential(
            "stale", "refresh-1",
        )));
        let mut api = MockAuthApi::new();
        api.expect_refresh().times(2).returning(|refresh: &RefreshToken, _| {
            let next = format!("{}-next", refresh.as_str());
            Ok(Credential::new(
                AccessToken::new(format!("access-for-{}", next)).unwrap(),
                RefreshToken::new(next).unwrap(),
            ))
        });
        let coordinator = AuthRefreshCoordinator::new(store, Arc::new(api), device());

        // when (操作):
        let first = coordinator.refresh().await.unwrap();
        let second = coordinator.refresh().await.unwrap();

        // then (期待する結果):
        assert_eq!(first.as_str(), "access-for-refresh-1-next");
        assert_eq!(second.as_str(), "access-for-refresh-1-next-next");
    }
}
