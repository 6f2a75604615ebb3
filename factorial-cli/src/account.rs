//! Account commands: login, status, refresh, and logout.

use crate::CliResult;
use clap::Args;
use factorial_core::config::{
    DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_SCOPE,
    REDIRECT_RELAY, local_redirect_uri,
};
use factorial_core::{
    ApiClient, Browser, Clock, ClientConfig, CredentialProvider, CredentialsEndpoint,
    FactorialError, LoginConfig, OAuthClient, SessionManager, SessionState, SessionStore,
    SystemBrowser, api_url, normalize_base_url,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments for the login command.
#[derive(Args, Clone, Debug)]
pub struct LoginArgs {
    /// OAuth2 application id.
    pub client_id: String,
    /// OAuth2 application secret.
    pub client_secret: String,
    /// Use the demo API instead of production.
    #[arg(long)]
    pub demo: bool,
    /// Override the API origin.
    #[arg(long, env = "FACTORIAL_API_URL")]
    pub api_url: Option<String>,
    /// OAuth2 access scope.
    #[arg(short, long, default_value = DEFAULT_SCOPE)]
    pub scope: String,
    /// Redirect URI registered for the OAuth2 application.
    #[arg(long = "redirect-url")]
    pub redirect_url: Option<String>,
    /// Host the callback listener binds.
    #[arg(long, default_value = DEFAULT_LISTEN_HOST)]
    pub listen_host: String,
    /// Port the callback listener binds.
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,
    /// Seconds to wait for the browser redirect.
    #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
    pub callback_timeout: u64,
    /// Print the authorization URL without launching a browser.
    #[arg(long)]
    pub no_browser: bool,
}

/// Settings shared by every account command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Where the session is persisted.
    pub session_path: PathBuf,
    /// HTTP and token-lifetime settings.
    pub client_config: ClientConfig,
}

/// Prints the authorization URL and optionally launches the system browser.
#[cfg_attr(test, allow(dead_code))]
struct ConsoleBrowser {
    launch: bool,
}

impl Browser for ConsoleBrowser {
    fn open(&self, url: &str) -> factorial_core::Result<()> {
        println!("Open the following URL in a browser and log in:\n{url}");
        if self.launch {
            SystemBrowser.open(url)
        } else {
            Ok(())
        }
    }
}

/// Run the interactive login and print the account it belongs to.
#[cfg(not(test))]
pub async fn run_login(args: LoginArgs, ctx: &Context) -> CliResult<()> {
    use factorial_core::{FileSessionStore, ReqwestOAuthClient, SystemClock, login};

    let config = login_config(&args)?;
    let client = ReqwestOAuthClient::new(&ctx.client_config)?;
    let store = FileSessionStore::new(&ctx.session_path);
    let browser = ConsoleBrowser {
        launch: !args.no_browser,
    };
    let session = login(
        &config,
        &client,
        &browser,
        &store,
        &SystemClock,
        ctx.client_config.refresh_token_ttl,
        ctrl_c(),
    )
    .await?;
    log::debug!("session stored at {}", ctx.session_path.display());

    let manager = SessionManager::new(
        session,
        client,
        store,
        Arc::new(SystemClock),
        ctx.client_config.clone(),
    );
    println!("{}", account_summary(manager, &ctx.client_config).await?);
    Ok(())
}

/// Resolves when the user presses Ctrl-C.
#[cfg(not(test))]
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("unable to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}

/// Translate CLI arguments into a login configuration.
#[cfg_attr(test, allow(dead_code))]
fn login_config(args: &LoginArgs) -> CliResult<LoginConfig> {
    let base_url = match &args.api_url {
        Some(url) => normalize_base_url(url)?,
        None => api_url(args.demo).to_string(),
    };
    let mut config = LoginConfig::new(&args.client_id, &args.client_secret, base_url);
    config.scope = args.scope.clone();
    config.listen_host = args.listen_host.clone();
    config.listen_port = args.listen_port;
    config.callback_timeout = Duration::from_secs(args.callback_timeout);
    config.redirect_uri = match &args.redirect_url {
        Some(url) => url.clone(),
        None => format!(
            "{REDIRECT_RELAY}{}",
            local_redirect_uri(&args.listen_host, args.listen_port)
        ),
    };
    Ok(config)
}

/// Describe the persisted session without touching the network.
pub async fn run_status_with<S: SessionStore>(
    store: &S,
    clock: &dyn Clock,
) -> CliResult<String> {
    let session = store.load().await?;
    let access = match session.state_at(clock.now()) {
        SessionState::Dead => {
            return Err(FactorialError::SessionExpired {
                expired_at: Some(session.refresh_token_expiration),
            }
            .into());
        }
        SessionState::Fresh => format!("valid until {}", session.access_token_expiration),
        SessionState::AccessExpired => format!(
            "expired at {} and will be refreshed on next use",
            session.access_token_expiration
        ),
    };
    Ok(format!(
        "Logged in on {}. Access token {access}. Session expires at {}.",
        session.base_url, session.refresh_token_expiration
    ))
}

/// Force a refresh of the persisted session and describe the account.
pub async fn run_refresh_with<C, S>(
    client: C,
    store: S,
    clock: Arc<dyn Clock>,
    config: &ClientConfig,
) -> CliResult<String>
where
    C: OAuthClient,
    S: SessionStore,
{
    let manager = SessionManager::load(client, store, clock, config.clone()).await?;
    manager.refresh().await?;
    account_summary(manager, config).await
}

/// Revoke the persisted session and remove it locally.
pub async fn run_logout_with<C, S>(
    client: C,
    store: S,
    clock: Arc<dyn Clock>,
    config: &ClientConfig,
) -> CliResult<String>
where
    C: OAuthClient,
    S: SessionStore,
{
    let session = match store.load().await {
        Ok(session) => session,
        Err(FactorialError::NoSessionFound(_)) => return Ok("No active session.".to_string()),
        Err(err @ FactorialError::CorruptSession { .. }) => {
            log::warn!("{err}");
            store.delete().await?;
            return Ok("Removed unreadable session file.".to_string());
        }
        Err(err) => return Err(err.into()),
    };
    if session.state_at(clock.now()) == SessionState::Dead {
        store.delete().await?;
        return Ok("Session had already expired; removed it.".to_string());
    }

    let manager = SessionManager::new(session, client, store, clock, config.clone());
    let report = manager.revoke().await?;
    if report.access_token_revoked && report.refresh_token_revoked {
        Ok("Logged out.".to_string())
    } else {
        Ok("Logged out locally; the provider could not confirm token revocation.".to_string())
    }
}

/// One-line summary of who the session belongs to.
async fn account_summary<P: SessionHolder>(provider: P, config: &ClientConfig) -> CliResult<String> {
    let base_url = provider.base_url();
    let api = ApiClient::new(&base_url, provider, config)?;
    let credentials = CredentialsEndpoint::new(&api).current().await?;
    let expires_at = api.credentials().expires_at();
    Ok(match credentials {
        Some(credentials) => format!(
            "Logged in as {} on {base_url}. Session expires at {expires_at}.",
            credentials.display_name()
        ),
        None => format!("Logged in on {base_url}. Session expires at {expires_at}."),
    })
}

/// Credential provider backed by a full session.
trait SessionHolder: CredentialProvider {
    fn base_url(&self) -> String;
    fn expires_at(&self) -> chrono::DateTime<chrono::Utc>;
}

impl<C: OAuthClient, S: SessionStore> SessionHolder for SessionManager<C, S> {
    fn base_url(&self) -> String {
        self.session().base_url
    }

    fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.session().refresh_token_expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use factorial_core::{
        FileSessionStore, ManualClock, ReqwestOAuthClient, Session, TokenResponse,
    };
    use httpmock::prelude::*;

    fn unique_path(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("factorial_cli_{label}_{nanos}"))
            .join("session.json")
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    async fn stored_session(path: &PathBuf, base_url: &str) -> FileSessionStore {
        let token = TokenResponse {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token_expires_in: None,
            created_at: None,
            scope: Some("read".to_string()),
        };
        let session = Session::from_token(
            &token,
            "client",
            "secret",
            base_url,
            t0(),
            ChronoDuration::days(7),
        )
        .expect("session");
        let store = FileSessionStore::new(path);
        store.save(&session).await.expect("save");
        store
    }

    fn login_args() -> LoginArgs {
        LoginArgs {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            demo: false,
            api_url: None,
            scope: "read".to_string(),
            redirect_url: None,
            listen_host: "localhost".to_string(),
            listen_port: 50101,
            callback_timeout: 300,
            no_browser: false,
        }
    }

    fn oauth_client() -> ReqwestOAuthClient {
        ReqwestOAuthClient::new(&ClientConfig::default()).expect("client")
    }

    #[test]
    fn login_config_defaults_to_production_and_relay_redirect() {
        let config = login_config(&login_args()).expect("config");
        assert_eq!(config.base_url, "https://api.factorialhr.com");
        assert_eq!(
            config.redirect_uri,
            "https://redirectmeto.com/http://localhost:50101/authorize/authorization_code"
        );
        assert_eq!(config.scope, "read");
        assert_eq!(config.callback_timeout, Duration::from_secs(300));
    }

    #[test]
    fn login_config_honors_demo_and_overrides() {
        let mut args = login_args();
        args.demo = true;
        args.listen_port = 50200;
        let config = login_config(&args).expect("config");
        assert_eq!(config.base_url, "https://api.demo.factorial.dev");
        assert!(config.redirect_uri.ends_with("localhost:50200/authorize/authorization_code"));

        args.api_url = Some("http://127.0.0.1:9000/".to_string());
        args.redirect_url = Some("http://localhost:50200/cb".to_string());
        let config = login_config(&args).expect("config");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.redirect_uri, "http://localhost:50200/cb");
    }

    #[test]
    fn login_config_rejects_bad_api_url() {
        let mut args = login_args();
        args.api_url = Some("api.factorialhr.com".to_string());
        assert!(login_config(&args).is_err());
    }

    #[tokio::test]
    async fn status_without_session_points_to_login() {
        let store = FileSessionStore::new(unique_path("status_missing"));
        let err = run_status_with(&store, &ManualClock::new(t0()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("login"));
    }

    #[tokio::test]
    async fn status_reports_expirations() {
        let path = unique_path("status");
        let store = stored_session(&path, "https://api.demo.factorial.dev").await;

        let fresh = run_status_with(&store, &ManualClock::new(t0()))
            .await
            .expect("status");
        assert!(fresh.contains("https://api.demo.factorial.dev"));
        assert!(fresh.contains("valid until"));

        let stale = run_status_with(&store, &ManualClock::new(t0() + ChronoDuration::hours(2)))
            .await
            .expect("status");
        assert!(stale.contains("will be refreshed"));

        let err = run_status_with(&store, &ManualClock::new(t0() + ChronoDuration::days(8)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert!(err.to_string().contains("login"));

        std::fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[tokio::test]
    async fn refresh_without_session_points_to_login() {
        let store = FileSessionStore::new(unique_path("refresh_missing"));
        let err = run_refresh_with(
            oauth_client(),
            store,
            Arc::new(ManualClock::new(t0())),
            &ClientConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("login"));
    }

    #[tokio::test]
    async fn refresh_rotates_tokens_and_prints_account() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=refresh-1");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "access-2",
                    "refresh_token": "refresh-2",
                    "token_type": "Bearer",
                    "expires_in": 3600
                }));
            })
            .await;
        let credentials = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/2025-01-01/resources/api_public/credentials")
                    .header("authorization", "Bearer access-2");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"company_id": 1, "id": "c1", "full_name": "Ada Lovelace"}],
                    "meta": {"limit": 100, "total": 1, "has_next_page": false}
                }));
            })
            .await;
        let path = unique_path("refresh");
        let store = stored_session(&path, &server.base_url()).await;
        let now = t0() + ChronoDuration::minutes(5);

        let message = run_refresh_with(
            oauth_client(),
            FileSessionStore::new(&path),
            Arc::new(ManualClock::new(now)),
            &ClientConfig::default(),
        )
        .await
        .expect("refresh");

        assert!(message.starts_with("Logged in as Ada Lovelace on "));
        let saved = store.load().await.expect("load");
        assert_eq!(saved.refresh_token, "refresh-2");
        assert_eq!(saved.created_at, now);
        token.assert_async().await;
        credentials.assert_async().await;

        std::fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[tokio::test]
    async fn logout_revokes_both_tokens_and_deletes_session() {
        let server = MockServer::start_async().await;
        let access = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/revoke")
                    .body_contains("token=access-1");
                then.status(200);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/revoke")
                    .body_contains("token=refresh-1");
                then.status(500);
            })
            .await;
        let path = unique_path("logout");
        let store = stored_session(&path, &server.base_url()).await;

        let message = run_logout_with(
            oauth_client(),
            FileSessionStore::new(&path),
            Arc::new(ManualClock::new(t0())),
            &ClientConfig::default(),
        )
        .await
        .expect("logout");

        assert!(message.starts_with("Logged out locally"));
        assert!(!store.exists().await);
        access.assert_async().await;
        refresh.assert_async().await;

        std::fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[tokio::test]
    async fn logout_of_expired_session_only_deletes_file() {
        let server = MockServer::start_async().await;
        let revoke = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/revoke");
                then.status(200);
            })
            .await;
        let path = unique_path("logout_expired");
        let store = stored_session(&path, &server.base_url()).await;

        let message = run_logout_with(
            oauth_client(),
            FileSessionStore::new(&path),
            Arc::new(ManualClock::new(t0() + ChronoDuration::days(8))),
            &ClientConfig::default(),
        )
        .await
        .expect("logout");

        assert!(message.contains("expired"));
        assert!(!store.exists().await);
        revoke.assert_hits_async(0).await;

        std::fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup");
    }

    #[tokio::test]
    async fn logout_without_session_succeeds() {
        let message = run_logout_with(
            oauth_client(),
            FileSessionStore::new(unique_path("logout_missing")),
            Arc::new(ManualClock::new(t0())),
            &ClientConfig::default(),
        )
        .await
        .expect("logout");
        assert_eq!(message, "No active session.");
    }
}
