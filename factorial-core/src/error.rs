//! Error types for the Factorial client.

use std::path::PathBuf;
use std::time::Duration;
use std::{error::Error, fmt, io};

use chrono::{DateTime, Utc};

/// Error type for Factorial session and API operations.
#[derive(Debug)]
pub enum FactorialError {
    /// No persisted session exists at the given path.
    NoSessionFound(PathBuf),
    /// The persisted session exists but could not be parsed.
    CorruptSession {
        /// Location of the unreadable session file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// The refresh token is no longer usable; a new login is required.
    SessionExpired {
        /// When the refresh token expired, if known from the clock.
        expired_at: Option<DateTime<Utc>>,
    },
    /// The callback `state` did not match the issued value.
    StateMismatch,
    /// The provider redirected with an `error` instead of a code.
    AuthorizationDenied {
        /// OAuth2 error code, e.g. `access_denied`.
        error: String,
        /// Optional human-readable description from the provider.
        description: Option<String>,
    },
    /// The callback carried a valid state but no usable code.
    InvalidCallback(String),
    /// No callback arrived within the configured window.
    CallbackTimeout(Duration),
    /// The interactive flow was cancelled by the user.
    Cancelled,
    /// The token endpoint answered with a non-success status.
    TokenExchange {
        /// HTTP status code.
        status: u16,
        /// Raw provider response body.
        body: String,
    },
    /// The token endpoint rejected the refresh token itself (400/401).
    RefreshRejected {
        /// HTTP status code.
        status: u16,
        /// Raw provider response body.
        body: String,
    },
    /// A resource call was still unauthorized after one refresh.
    Unauthorized,
    /// A resource call answered with a non-success status.
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Transport-level HTTP failure.
    Http(reqwest::Error),
    /// An underlying I/O error.
    Io(io::Error),
    /// JSON (de)serialization failure.
    Json(serde_json::Error),
    /// A catch-all error with a message.
    Other(String),
}

impl FactorialError {
    /// Whether retrying the failed operation later may succeed without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::TokenExchange { status, .. } | Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the user has to run an interactive login to recover.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::NoSessionFound(_)
                | Self::CorruptSession { .. }
                | Self::SessionExpired { .. }
                | Self::RefreshRejected { .. }
        )
    }
}

impl fmt::Display for FactorialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSessionFound(path) => write!(
                f,
                "no session found at {}. Login with \"factorialhr login\"",
                path.display()
            ),
            Self::CorruptSession { path, message } => write!(
                f,
                "session file {} is unreadable ({message}). Login with \"factorialhr login\" to replace it",
                path.display()
            ),
            Self::SessionExpired {
                expired_at: Some(at),
            } => write!(
                f,
                "session expired at {at}. Login with \"factorialhr login\""
            ),
            Self::SessionExpired { expired_at: None } => {
                write!(f, "session expired. Login with \"factorialhr login\"")
            }
            Self::StateMismatch => write!(
                f,
                "oauth state mismatch in authorization callback; login aborted"
            ),
            Self::AuthorizationDenied {
                error,
                description: Some(description),
            } => write!(f, "authorization denied ({error}): {description}"),
            Self::AuthorizationDenied {
                error,
                description: None,
            } => write!(f, "authorization denied ({error})"),
            Self::InvalidCallback(message) => write!(f, "invalid authorization callback: {message}"),
            Self::CallbackTimeout(timeout) => write!(
                f,
                "timed out after {}s waiting for the authorization callback",
                timeout.as_secs()
            ),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::TokenExchange { status, body } => {
                write!(f, "token endpoint error ({status}): {body}")
            }
            Self::RefreshRejected { status, body } => write!(
                f,
                "refresh token rejected ({status}): {body}. Login with \"factorialhr login\""
            ),
            Self::Unauthorized => write!(f, "request unauthorized after refreshing the session"),
            Self::Api { status, body } => write!(f, "factorial api error ({status}): {body}"),
            Self::Http(err) => write!(f, "http error: {err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for FactorialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FactorialError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for FactorialError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<serde_json::Error> for FactorialError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Convenience result type for the Factorial client.
pub type Result<T> = std::result::Result<T, FactorialError>;
