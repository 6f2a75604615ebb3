#![deny(missing_docs)]
//! FactorialHR core library.
//!
//! OAuth2 login and session handling plus a typed REST client for the
//! FactorialHR API.

/// Session lifecycle and credential providers.
pub mod auth;
/// Loopback redirect listener and authorization URL helpers.
pub mod callback;
pub mod client;
/// Injectable time source.
pub mod clock;
pub mod config;
pub mod error;
pub mod login;
pub mod resources;
pub mod session;
pub mod store;
pub mod token;

pub use auth::{CredentialProvider, RevokeReport, SessionManager, StaticCredentials};
pub use callback::{CallbackListener, CallbackParams, authorize_url, new_state};
pub use client::ApiClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ClientConfig, DEMO_API_URL, LoginConfig, PRODUCTION_API_URL, api_url, normalize_base_url,
};
pub use error::{FactorialError, Result};
pub use login::{Browser, SystemBrowser, login};
pub use resources::{Credentials, CredentialsEndpoint, Meta, Page};
pub use session::{Session, SessionState};
pub use store::{FileSessionStore, SessionStore, resolve_session_path};
pub use token::{OAuthClient, ReqwestOAuthClient, TokenResponse};
