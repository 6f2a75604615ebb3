//! OAuth2 session snapshot and its clock-driven state.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FactorialError, Result};
use crate::token::TokenResponse;

/// Access-token lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Lifecycle state of a session at a given instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The access token is still valid.
    Fresh,
    /// The access token expired but the refresh token is still valid.
    AccessExpired,
    /// The refresh token expired; only a new login helps.
    Dead,
}

impl SessionState {
    /// Human-readable state label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Fresh => "fresh",
            SessionState::AccessExpired => "access_expired",
            SessionState::Dead => "dead",
        }
    }

    /// Whether requests can still be authorized, possibly after a refresh.
    pub fn is_usable(&self) -> bool {
        !matches!(self, SessionState::Dead)
    }
}

/// One snapshot of the tokens issued to this client.
///
/// A refresh never mutates a session in place; it produces a new snapshot via
/// [`Session::refreshed`], which the caller persists before using it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Long-lived token, rotated by every refresh.
    pub refresh_token: String,
    /// Authorization scheme, usually `Bearer`.
    pub token_type: String,
    /// OAuth2 application id.
    pub client_id: String,
    /// OAuth2 application secret.
    pub client_secret: String,
    /// Moment of the most recent token issuance.
    pub created_at: DateTime<Utc>,
    /// When the access token stops being accepted.
    pub access_token_expiration: DateTime<Utc>,
    /// When the refresh token stops being accepted.
    pub refresh_token_expiration: DateTime<Utc>,
    /// Granted scope, when reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// API origin this session is valid against.
    pub base_url: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("client_id", &self.client_id)
            .field("created_at", &self.created_at)
            .field("access_token_expiration", &self.access_token_expiration)
            .field("refresh_token_expiration", &self.refresh_token_expiration)
            .field("scope", &self.scope)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session from a token issued at `issued_at`.
    ///
    /// Fails when the advertised lifetimes do not fit in a timestamp.
    pub fn from_token(
        token: &TokenResponse,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
        issued_at: DateTime<Utc>,
        refresh_token_ttl: Duration,
    ) -> Result<Self> {
        let (access_token_expiration, refresh_token_expiration) =
            expirations(token, issued_at, refresh_token_ttl)?;
        Ok(Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            token_type: token.token_type.clone(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            created_at: issued_at,
            access_token_expiration,
            refresh_token_expiration,
            scope: token.scope.clone(),
            base_url: base_url.into(),
        })
    }

    /// New snapshot after a successful refresh; client credentials and origin carry over.
    pub fn refreshed(
        &self,
        token: &TokenResponse,
        issued_at: DateTime<Utc>,
        refresh_token_ttl: Duration,
    ) -> Result<Self> {
        let mut next = Self::from_token(
            token,
            self.client_id.clone(),
            self.client_secret.clone(),
            self.base_url.clone(),
            issued_at,
            refresh_token_ttl,
        )?;
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        Ok(next)
    }

    /// State of the session at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_refresh_token_expired_at(now) {
            SessionState::Dead
        } else if self.is_access_token_expired_at(now) {
            SessionState::AccessExpired
        } else {
            SessionState::Fresh
        }
    }

    /// True iff `now >= access_token_expiration`.
    pub fn is_access_token_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_token_expiration
    }

    /// True iff `now >= refresh_token_expiration`.
    pub fn is_refresh_token_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_token_expiration
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

fn expirations(
    token: &TokenResponse,
    issued_at: DateTime<Utc>,
    refresh_token_ttl: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let access_secs = token.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
    let access = expiry_after(issued_at, access_secs, "expires_in")?;
    let refresh = match token.refresh_token_expires_in {
        Some(secs) => expiry_after(issued_at, secs, "refresh_token_expires_in")?,
        None => issued_at.checked_add_signed(refresh_token_ttl).ok_or_else(|| {
            FactorialError::Other(format!(
                "refresh token lifetime out of range: {refresh_token_ttl}"
            ))
        })?,
    };
    Ok((access, refresh))
}

/// `issued_at + secs`, refusing provider values chrono cannot represent.
fn expiry_after(issued_at: DateTime<Utc>, secs: i64, field: &str) -> Result<DateTime<Utc>> {
    Duration::try_seconds(secs)
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .ok_or_else(|| FactorialError::Other(format!("token {field} out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn token(access: &str, refresh: &str, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token_expires_in: None,
            created_at: None,
            scope: Some("read".to_string()),
        }
    }

    fn session() -> Session {
        Session::from_token(
            &token("access-1", "refresh-1", Some(3600)),
            "client",
            "secret",
            "https://api.demo.factorial.dev",
            t0(),
            Duration::days(30),
        )
        .expect("session")
    }

    #[test]
    fn from_token_computes_absolute_expirations() {
        let session = session();
        assert_eq!(session.created_at, t0());
        assert_eq!(session.access_token_expiration, t0() + Duration::seconds(3600));
        assert_eq!(session.refresh_token_expiration, t0() + Duration::days(30));
    }

    #[test]
    fn missing_expires_in_defaults_to_one_hour() {
        let session = Session::from_token(
            &token("a", "r", None),
            "client",
            "secret",
            "https://api.factorialhr.com",
            t0(),
            Duration::days(7),
        )
        .expect("session");
        assert_eq!(session.access_token_expiration, t0() + Duration::hours(1));
    }

    #[test]
    fn provider_refresh_ttl_wins_over_fallback() {
        let mut response = token("a", "r", Some(60));
        response.refresh_token_expires_in = Some(120);
        let session = Session::from_token(
            &response,
            "client",
            "secret",
            "https://api.factorialhr.com",
            t0(),
            Duration::days(7),
        )
        .expect("session");
        assert_eq!(session.refresh_token_expiration, t0() + Duration::seconds(120));
    }

    #[test]
    fn expiry_boundaries_are_inclusive() {
        let session = session();
        let access_exp = session.access_token_expiration;
        assert!(!session.is_access_token_expired_at(access_exp - Duration::seconds(1)));
        assert!(session.is_access_token_expired_at(access_exp));
        let refresh_exp = session.refresh_token_expiration;
        assert!(!session.is_refresh_token_expired_at(refresh_exp - Duration::seconds(1)));
        assert!(session.is_refresh_token_expired_at(refresh_exp));
    }

    #[test]
    fn state_follows_the_clock() {
        let session = session();
        assert_eq!(session.state_at(t0()), SessionState::Fresh);
        let later = t0() + Duration::seconds(3601);
        assert!(session.is_access_token_expired_at(later));
        assert!(!session.is_refresh_token_expired_at(later));
        assert_eq!(session.state_at(later), SessionState::AccessExpired);
        assert_eq!(
            session.state_at(t0() + Duration::days(30)),
            SessionState::Dead
        );
        assert!(!SessionState::Dead.is_usable());
    }

    #[test]
    fn refreshed_replaces_tokens_and_keeps_credentials() {
        let session = session();
        let at = t0() + Duration::hours(2);
        let next = session
            .refreshed(&token("access-2", "refresh-2", Some(1800)), at, Duration::days(30))
            .expect("refreshed");
        assert_eq!(next.access_token, "access-2");
        assert_eq!(next.refresh_token, "refresh-2");
        assert_ne!(next.refresh_token, session.refresh_token);
        assert_eq!(next.client_id, "client");
        assert_eq!(next.client_secret, "secret");
        assert_eq!(next.base_url, session.base_url);
        assert_eq!(next.created_at, at);
        assert_eq!(next.access_token_expiration, at + Duration::seconds(1800));
    }

    #[test]
    fn out_of_range_lifetimes_are_errors_not_panics() {
        let huge: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":9223372036854775807}"#,
        )
        .expect("parse");
        let err = Session::from_token(
            &huge,
            "client",
            "secret",
            "https://api.factorialhr.com",
            t0(),
            Duration::days(7),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expires_in"));

        let mut response = token("a", "r", Some(3600));
        response.refresh_token_expires_in = Some(i64::MAX);
        let err = session()
            .refreshed(&response, t0(), Duration::days(7))
            .unwrap_err();
        assert!(err.to_string().contains("refresh_token_expires_in"));

        let err = Session::from_token(
            &token("a", "r", Some(3600)),
            "client",
            "secret",
            "https://api.factorialhr.com",
            t0(),
            Duration::MAX,
        )
        .unwrap_err();
        assert!(matches!(err, FactorialError::Other(_)));
    }

    #[test]
    fn authorization_header_joins_type_and_token() {
        assert_eq!(session().authorization_header(), "Bearer access-1");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
        assert!(!rendered.contains("secret\""));
    }
}
