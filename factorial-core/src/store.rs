//! Session persistence on the local filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;

use crate::error::{FactorialError, Result};
use crate::session::Session;
use crate::token::BoxFuture;

/// Environment variable overriding the session file location.
pub const SESSION_PATH_ENV: &str = "FACTORIAL_SESSION_PATH";

const APP_DIR: &str = "factorialhr";
const SESSION_FILE: &str = "session.json";

/// Durable storage for the current session.
///
/// Returned futures own everything they touch, so they can be awaited while
/// the caller holds its own locks.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Persist the session, replacing any previous one.
    fn save(&self, session: &Session) -> BoxFuture<'static, Result<()>>;
    /// Load the persisted session.
    fn load(&self) -> BoxFuture<'static, Result<Session>>;
    /// Remove the persisted session; succeeds when nothing is stored.
    fn delete(&self) -> BoxFuture<'static, Result<()>>;
}

/// JSON file store with write-then-rename replacement.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a session file currently exists.
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, session: &Session) -> BoxFuture<'static, Result<()>> {
        let path = self.path.clone();
        let payload = serde_json::to_vec_pretty(session);
        Box::pin(async move {
            let payload = payload?;
            write_session(&path, &payload).await
        })
    }

    fn load(&self) -> BoxFuture<'static, Result<Session>> {
        let path = self.path.clone();
        Box::pin(async move { read_session(path).await })
    }

    fn delete(&self) -> BoxFuture<'static, Result<()>> {
        let path = self.path.clone();
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::debug!("session removed from {}", path.display());
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

async fn write_session(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp_path = temp_path(path);
    if let Err(err) = write_private(&tmp_path, payload).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    tokio::fs::rename(&tmp_path, path).await?;
    log::debug!("session saved to {}", path.display());
    Ok(())
}

async fn read_session(path: PathBuf) -> Result<Session> {
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(FactorialError::NoSessionFound(path));
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&contents).map_err(|err| FactorialError::CorruptSession {
        path,
        message: err.to_string(),
    })
}

/// Unique sibling temp file so concurrent saves never share a partial file.
fn temp_path(path: &Path) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| SESSION_FILE.to_string());
    path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

async fn write_private(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(payload).await?;
    file.sync_all().await
}

/// Resolve the local path where the session is stored.
pub fn resolve_session_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = std::env::var(SESSION_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    if let Ok(base) = std::env::var("XDG_CONFIG_HOME") {
        if !base.trim().is_empty() {
            return Ok(PathBuf::from(base).join(APP_DIR).join(SESSION_FILE));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home)
                .join(".config")
                .join(APP_DIR)
                .join(SESSION_FILE));
        }
    }
    Err(FactorialError::Other(
        "unable to resolve session storage path".to_string(),
    ))
}
