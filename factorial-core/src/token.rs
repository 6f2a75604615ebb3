//! OAuth2 token endpoint calls: code exchange, refresh, and revocation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::{FactorialError, Result};

/// Boxed future returned by the OAuth client seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Token payload returned by `/oauth/token`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// New bearer token.
    pub access_token: String,
    /// New refresh token; replaces the previous one.
    pub refresh_token: String,
    /// Authorization scheme.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until the access token expires, counted from the response.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Seconds until the refresh token expires, when the provider reports it.
    #[serde(default)]
    pub refresh_token_expires_in: Option<i64>,
    /// Provider-side issuance time as epoch seconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token_expires_in", &self.refresh_token_expires_in)
            .field("created_at", &self.created_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Which grant a token request used; decides how failures are classified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// HTTP client abstraction for the provider's OAuth2 endpoints.
pub trait OAuthClient: Send + Sync {
    /// Trade an authorization code for the first token pair.
    fn exchange_code<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>>;

    /// Trade a refresh token for a new token pair.
    fn refresh<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>>;

    /// Revoke a single access or refresh token.
    fn revoke<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Reqwest-backed OAuth client.
#[derive(Debug, Clone)]
pub struct ReqwestOAuthClient {
    client: Client,
}

impl ReqwestOAuthClient {
    /// Build a client honoring the configured timeout and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
        })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl OAuthClient for ReqwestOAuthClient {
    fn exchange_code<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(request_token(
            &self.client,
            base_url,
            Grant::AuthorizationCode,
            vec![
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("grant_type", Grant::AuthorizationCode.as_str()),
                ("redirect_uri", redirect_uri),
            ],
        ))
    }

    fn refresh<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(request_token(
            &self.client,
            base_url,
            Grant::RefreshToken,
            vec![
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", Grant::RefreshToken.as_str()),
                ("refresh_token", refresh_token),
            ],
        ))
    }

    fn revoke<'a>(
        &'a self,
        base_url: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(revoke_token(
            &self.client,
            base_url,
            client_id,
            client_secret,
            token,
        ))
    }
}

/// Token endpoint for an API origin.
pub fn token_url(base_url: &str) -> String {
    format!("{}/oauth/token", base_url.trim_end_matches('/'))
}

/// Revoke endpoint for an API origin.
pub fn revoke_url(base_url: &str) -> String {
    format!("{}/oauth/revoke", base_url.trim_end_matches('/'))
}

async fn request_token(
    client: &Client,
    base_url: &str,
    grant: Grant,
    form: Vec<(&str, &str)>,
) -> Result<TokenResponse> {
    log::debug!("requesting token with grant {}", grant.as_str());
    let response = client
        .post(token_url(base_url))
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;
    read_token_response(response, grant).await
}

async fn read_token_response(response: Response, grant: Grant) -> Result<TokenResponse> {
    let status = response.status();
    if status.is_success() {
        let token = response.json::<TokenResponse>().await?;
        log::debug!(
            "token issued (grant {}, expires_in {:?}, provider created_at {:?})",
            grant.as_str(),
            token.expires_in,
            token.created_at
        );
        return Ok(token);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_token_failure(grant, status, body))
}

fn classify_token_failure(grant: Grant, status: StatusCode, body: String) -> FactorialError {
    let rejected = matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED);
    if grant == Grant::RefreshToken && rejected {
        return FactorialError::RefreshRejected {
            status: status.as_u16(),
            body,
        };
    }
    FactorialError::TokenExchange {
        status: status.as_u16(),
        body,
    }
}

async fn revoke_token(
    client: &Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
    token: &str,
) -> Result<()> {
    let response = client
        .post(revoke_url(base_url))
        .header("Accept", "application/json")
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("token", token),
        ])
        .send()
        .await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(FactorialError::TokenExchange {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn client() -> ReqwestOAuthClient {
        ReqwestOAuthClient::new(&ClientConfig::default()).expect("client")
    }

    fn token_body(access: &str, refresh: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "read",
            "created_at": 1_740_830_400
        })
    }

    #[test]
    fn endpoint_urls_ignore_trailing_slash() {
        assert_eq!(
            token_url("https://api.factorialhr.com/"),
            "https://api.factorialhr.com/oauth/token"
        );
        assert_eq!(
            revoke_url("https://api.factorialhr.com"),
            "https://api.factorialhr.com/oauth/revoke"
        );
    }

    #[test]
    fn token_response_defaults_optional_fields() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).expect("parse");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, None);
        assert_eq!(token.scope, None);
    }

    #[test]
    fn token_response_debug_hides_tokens() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"secret-a","refresh_token":"secret-r"}"#)
                .expect("parse");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-a"));
        assert!(!rendered.contains("secret-r"));
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=code-123")
                    .body_contains("client_id=client")
                    .body_contains("client_secret=secret")
                    .body_contains("redirect_uri=http%3A%2F%2Flocalhost%3A50101");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("access-1", "refresh-1"));
            })
            .await;

        let token = client()
            .exchange_code(
                &server.base_url(),
                "client",
                "secret",
                "code-123",
                "http://localhost:50101/authorize/authorization_code",
            )
            .await
            .expect("token");
        assert_eq!(token.access_token, "access-1");
        assert_eq!(token.refresh_token, "refresh-1");
        assert_eq!(token.expires_in, Some(3600));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exchange_code_failure_wraps_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(400).body(r#"{"error":"invalid_grant"}"#);
            })
            .await;

        let err = client()
            .exchange_code(&server.base_url(), "client", "secret", "bad", "http://localhost")
            .await
            .unwrap_err();
        match err {
            FactorialError::TokenExchange { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected TokenExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=refresh-1");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("access-2", "refresh-2"));
            })
            .await;

        let token = client()
            .refresh(&server.base_url(), "client", "secret", "refresh-1")
            .await
            .expect("token");
        assert_eq!(token.refresh_token, "refresh-2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_rejection_is_distinct_from_server_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_contains("refresh_token=dead");
                then.status(401).body("revoked");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_contains("refresh_token=flaky");
                then.status(503).body("maintenance");
            })
            .await;

        let rejected = client()
            .refresh(&server.base_url(), "client", "secret", "dead")
            .await
            .unwrap_err();
        assert!(matches!(
            rejected,
            FactorialError::RefreshRejected { status: 401, .. }
        ));
        assert!(!rejected.is_transient());

        let transient = client()
            .refresh(&server.base_url(), "client", "secret", "flaky")
            .await
            .unwrap_err();
        assert!(matches!(
            transient,
            FactorialError::TokenExchange { status: 503, .. }
        ));
        assert!(transient.is_transient());
    }

    #[tokio::test]
    async fn revoke_posts_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/revoke")
                    .body_contains("token=access-1")
                    .body_contains("client_id=client");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        client()
            .revoke(&server.base_url(), "client", "secret", "access-1")
            .await
            .expect("revoke");
        mock.assert_async().await;
    }
}
