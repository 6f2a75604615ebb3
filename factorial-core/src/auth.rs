//! Session lifecycle: expiry checks, single-flight refresh, and revocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::{FactorialError, Result};
use crate::session::{Session, SessionState};
use crate::store::SessionStore;
use crate::token::{BoxFuture, OAuthClient};

/// Capability the REST client needs to authorize requests.
pub trait CredentialProvider: Send + Sync {
    /// Make sure the current credential is usable, refreshing it when needed.
    fn ensure_valid(&self) -> BoxFuture<'_, Result<()>>;

    /// Name of the header carrying the credential.
    fn header_name(&self) -> &'static str {
        AUTHORIZATION_HEADER
    }

    /// Header value for the current credential.
    fn authorization_header(&self) -> String;

    /// React to a 401 answered for `rejected_header`.
    ///
    /// Implementations refresh at most once per rejected credential; a caller
    /// that observes a second 401 must give up.
    fn refresh_after_unauthorized<'a>(&'a self, rejected_header: &'a str)
    -> BoxFuture<'a, Result<()>>;
}

const AUTHORIZATION_HEADER: &str = "authorization";
const API_KEY_HEADER: &str = "x-api-key";

/// Fixed credential that is never refreshed.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    header_name: &'static str,
    value: String,
}

impl StaticCredentials {
    /// `Authorization: {token_type} {access_token}` credential.
    pub fn new(token_type: &str, access_token: &str) -> Self {
        Self {
            header_name: AUTHORIZATION_HEADER,
            value: format!("{token_type} {access_token}"),
        }
    }

    /// Bearer credential for a pre-issued access token.
    pub fn bearer(access_token: &str) -> Self {
        Self::new("Bearer", access_token)
    }

    /// Company API key sent in the `x-api-key` header.
    pub fn api_key(key: &str) -> Self {
        Self {
            header_name: API_KEY_HEADER,
            value: key.to_string(),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn ensure_valid(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn header_name(&self) -> &'static str {
        self.header_name
    }

    fn authorization_header(&self) -> String {
        self.value.clone()
    }

    fn refresh_after_unauthorized<'a>(
        &'a self,
        _rejected_header: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(FactorialError::Unauthorized) })
    }
}

/// Result of a best-effort logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevokeReport {
    /// Whether the provider confirmed the access-token revocation.
    pub access_token_revoked: bool,
    /// Whether the provider confirmed the refresh-token revocation.
    pub refresh_token_revoked: bool,
}

/// Owns the current session snapshot and keeps it alive.
///
/// Refreshes are serialized by an async mutex so two callers never spend the
/// same single-use refresh token; every new snapshot is written to the store
/// before the refresh call returns.
pub struct SessionManager<C, S> {
    current: RwLock<Session>,
    refresh_lock: Mutex<()>,
    rejected: AtomicBool,
    client: C,
    store: S,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
}

impl<C: OAuthClient, S: SessionStore> SessionManager<C, S> {
    /// Manage an existing session.
    pub fn new(
        session: Session,
        client: C,
        store: S,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        Self {
            current: RwLock::new(session),
            refresh_lock: Mutex::new(()),
            rejected: AtomicBool::new(false),
            client,
            store,
            clock,
            config,
        }
    }

    /// Manage the session persisted in `store`.
    pub async fn load(
        client: C,
        store: S,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Result<Self> {
        let session = store.load().await?;
        Ok(Self::new(session, client, store, clock, config))
    }

    /// Copy of the current snapshot.
    pub fn session(&self) -> Session {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Store this manager persists to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.rejected.load(Ordering::SeqCst) {
            return SessionState::Dead;
        }
        self.session().state_at(self.clock.now())
    }

    /// Whether the access token has expired by the manager's clock.
    pub fn is_access_token_expired(&self) -> bool {
        self.session().is_access_token_expired_at(self.clock.now())
    }

    /// Whether the refresh token has expired by the manager's clock.
    pub fn is_refresh_token_expired(&self) -> bool {
        self.session().is_refresh_token_expired_at(self.clock.now())
    }

    /// `Authorization` header value for the current access token.
    pub fn authorization_header(&self) -> String {
        self.session().authorization_header()
    }

    /// No-op when fresh, refresh when the access token expired, fail when dead.
    pub async fn ensure_valid(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        match self.state() {
            SessionState::Fresh => Ok(()),
            SessionState::AccessExpired => self.refresh_locked().await,
            SessionState::Dead => Err(self.expired_error()),
        }
    }

    /// Refresh even though the access token may still be valid.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if self.state() == SessionState::Dead {
            return Err(self.expired_error());
        }
        self.refresh_locked().await
    }

    /// Refresh unless another caller already replaced `rejected_header`.
    pub async fn refresh_after_unauthorized(&self, rejected_header: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if self.state() == SessionState::Dead {
            return Err(self.expired_error());
        }
        if self.authorization_header() != rejected_header {
            log::debug!("access token already rotated by a concurrent refresh");
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Revoke both tokens concurrently, then delete the persisted session.
    ///
    /// Network failures are logged and reported, never returned: local logout
    /// always completes. Only a failure to delete the file is an error.
    pub async fn revoke(&self) -> Result<RevokeReport> {
        let _guard = self.refresh_lock.lock().await;
        let session = self.session();
        let (access, refresh) = tokio::join!(
            self.client.revoke(
                &session.base_url,
                &session.client_id,
                &session.client_secret,
                &session.access_token,
            ),
            self.client.revoke(
                &session.base_url,
                &session.client_id,
                &session.client_secret,
                &session.refresh_token,
            ),
        );
        if let Err(err) = &access {
            log::warn!("failed to revoke access token: {err}");
        }
        if let Err(err) = &refresh {
            log::warn!("failed to revoke refresh token: {err}");
        }
        self.rejected.store(true, Ordering::SeqCst);
        self.store.delete().await?;
        Ok(RevokeReport {
            access_token_revoked: access.is_ok(),
            refresh_token_revoked: refresh.is_ok(),
        })
    }

    async fn refresh_locked(&self) -> Result<()> {
        let current = self.session();
        let issued_at = self.clock.now();
        log::debug!("refreshing session for client {}", current.client_id);
        let token = match self
            .client
            .refresh(
                &current.base_url,
                &current.client_id,
                &current.client_secret,
                &current.refresh_token,
            )
            .await
        {
            Ok(token) => token,
            Err(err @ FactorialError::RefreshRejected { .. }) => {
                log::warn!("refresh token rejected; session is no longer usable");
                self.rejected.store(true, Ordering::SeqCst);
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        if token.refresh_token == current.refresh_token {
            log::warn!("provider did not rotate the refresh token");
        }
        let next = current.refreshed(&token, issued_at, self.config.refresh_token_ttl)?;
        // The old refresh token is spent; keep the new one even if saving fails.
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();
        self.store.save(&next).await?;
        log::debug!(
            "session refreshed; access token valid until {}",
            next.access_token_expiration
        );
        Ok(())
    }

    fn expired_error(&self) -> FactorialError {
        let session = self.session();
        let expired_at = if session.is_refresh_token_expired_at(self.clock.now()) {
            Some(session.refresh_token_expiration)
        } else {
            None
        };
        FactorialError::SessionExpired { expired_at }
    }
}

impl<C: OAuthClient, S: SessionStore> CredentialProvider for SessionManager<C, S> {
    fn ensure_valid(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(SessionManager::ensure_valid(self))
    }

    fn authorization_header(&self) -> String {
        SessionManager::authorization_header(self)
    }

    fn refresh_after_unauthorized<'a>(
        &'a self,
        rejected_header: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(SessionManager::refresh_after_unauthorized(self, rejected_header))
    }
}
