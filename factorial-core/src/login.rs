//! Interactive authorization-code login.

use std::future::Future;

use crate::callback::{CallbackListener, authorize_url, new_state};
use crate::clock::Clock;
use crate::config::{CALLBACK_PATH, LoginConfig};
use crate::error::{FactorialError, Result};
use crate::session::Session;
use crate::store::SessionStore;
use crate::token::OAuthClient;

/// Something able to show the authorization page to the user.
pub trait Browser: Send + Sync {
    /// Open `url`; failures are reported but do not abort the login.
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that(url)
            .map_err(|err| FactorialError::Other(format!("failed to open browser: {err}")))
    }
}

/// Run the full login: listen, send the user to the provider, exchange the
/// code, and persist the resulting session.
///
/// The listener is bound before the browser is opened so a fast redirect is
/// never missed, and it is released on every exit path. The token endpoint is
/// only contacted once the callback passed the `state` check.
pub async fn login<C, B, S, F>(
    config: &LoginConfig,
    client: &C,
    browser: &B,
    store: &S,
    clock: &dyn Clock,
    refresh_token_ttl: chrono::Duration,
    cancel: F,
) -> Result<Session>
where
    C: OAuthClient,
    B: Browser,
    S: SessionStore,
    F: Future<Output = ()>,
{
    let listener =
        CallbackListener::bind(&config.listen_host, config.listen_port, CALLBACK_PATH).await?;
    let state = new_state();
    let url = authorize_url(
        &config.base_url,
        &config.client_id,
        &config.redirect_uri,
        &config.scope,
        &state,
    );
    if let Err(err) = browser.open(&url) {
        log::warn!("{err}");
    }

    let code = listener
        .wait_for_code(&state, config.callback_timeout, cancel)
        .await?;

    let issued_at = clock.now();
    let token = client
        .exchange_code(
            &config.base_url,
            &config.client_id,
            &config.client_secret,
            &code,
            &config.redirect_uri,
        )
        .await?;
    if let Some(created_at) = token.created_at {
        log::debug!("provider reported token creation at {created_at}");
    }
    let session = Session::from_token(
        &token,
        config.client_id.as_str(),
        config.client_secret.as_str(),
        config.base_url.as_str(),
        issued_at,
        refresh_token_ttl,
    )?;
    store.save(&session).await?;
    log::info!("logged in to {}", session.base_url);
    Ok(session)
}
