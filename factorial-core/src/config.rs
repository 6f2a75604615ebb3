//! Endpoints, defaults, and tunables for the Factorial client.

use std::time::Duration;

use reqwest::Client;

use crate::error::{FactorialError, Result};

/// Production API origin.
pub const PRODUCTION_API_URL: &str = "https://api.factorialhr.com";
/// Demo API origin.
pub const DEMO_API_URL: &str = "https://api.demo.factorial.dev";
/// Scope requested when none is given.
pub const DEFAULT_SCOPE: &str = "read";
/// Host the callback listener binds by default.
pub const DEFAULT_LISTEN_HOST: &str = "localhost";
/// Port the callback listener binds by default.
pub const DEFAULT_LISTEN_PORT: u16 = 50101;
/// Path the provider redirects to with the authorization code.
pub const CALLBACK_PATH: &str = "/authorize/authorization_code";
/// Public relay used because the provider rejects loopback redirect URIs.
pub const REDIRECT_RELAY: &str = "https://redirectmeto.com/";

/// HTTP request timeout used when none is configured.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// How long `login` waits for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const USER_AGENT: &str = concat!("factorialhr-rs/", env!("CARGO_PKG_VERSION"));

/// Pick the API origin for production or demo.
pub fn api_url(demo: bool) -> &'static str {
    if demo { DEMO_API_URL } else { PRODUCTION_API_URL }
}

/// Local redirect target for a listener on `host:port`.
pub fn local_redirect_uri(host: &str, port: u16) -> String {
    format!("http://{host}:{port}{CALLBACK_PATH}")
}

/// Default redirect URI: the local target tunneled through the public relay.
pub fn default_redirect_uri() -> String {
    format!(
        "{REDIRECT_RELAY}{}",
        local_redirect_uri(DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT)
    )
}

/// Normalize an API origin for consistent URL joining.
pub fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(FactorialError::Other("api url is required".to_string()));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(FactorialError::Other(format!(
            "api url must start with http:// or https://: {trimmed}"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// HTTP and token-lifetime settings shared by every client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall timeout applied to every HTTP request.
    pub http_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Refresh-token lifetime assumed when the provider does not send one.
    pub refresh_token_ttl: chrono::Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            refresh_token_ttl: chrono::Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

impl ClientConfig {
    /// Override the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Build a reqwest client honoring this configuration.
    pub fn http_client(&self) -> Result<Client> {
        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.http_timeout)
            .build()?;
        Ok(client)
    }
}

/// Parameters of one interactive authorization-code login.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// OAuth2 application id.
    pub client_id: String,
    /// OAuth2 application secret.
    pub client_secret: String,
    /// API origin the session will be valid against.
    pub base_url: String,
    /// Requested scope.
    pub scope: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Host the callback listener binds.
    pub listen_host: String,
    /// Port the callback listener binds.
    pub listen_port: u16,
    /// How long to wait for the browser redirect.
    pub callback_timeout: Duration,
}

impl LoginConfig {
    /// Build a login configuration with the default scope, redirect, and listener.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: base_url.into(),
            scope: DEFAULT_SCOPE.to_string(),
            redirect_uri: default_redirect_uri(),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
        }
    }
}
