//! Loopback listener that captures the OAuth2 authorization redirect.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use crate::error::{FactorialError, Result};

const MAX_REQUEST_BYTES: usize = 16 * 1024;
// Browsers open speculative connections that never send a request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Generate a fresh CSRF `state` value.
pub fn new_state() -> String {
    Uuid::new_v4().to_string()
}

/// Browser-facing authorization URL.
pub fn authorize_url(
    base_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
        urlencoding::encode(state),
    )
}

/// Query parameters carried by the provider redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed CSRF state.
    pub state: Option<String>,
    /// OAuth2 error code.
    pub error: Option<String>,
    /// Human-readable error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string (without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let decoded = urlencoding::decode(&value)
                .map(|value| value.into_owned())
                .unwrap_or(value);
            match key {
                "code" => params.code = Some(decoded),
                "state" => params.state = Some(decoded),
                "error" => params.error = Some(decoded),
                "error_description" => params.error_description = Some(decoded),
                _ => {}
            }
        }
        params
    }

    /// Validate the redirect against the issued state and extract the code.
    pub fn into_code(self, expected_state: &str) -> Result<String> {
        if self.state.as_deref() != Some(expected_state) {
            return Err(FactorialError::StateMismatch);
        }
        if let Some(error) = self.error {
            return Err(FactorialError::AuthorizationDenied {
                error,
                description: self.error_description,
            });
        }
        match self.code {
            Some(code) if !code.trim().is_empty() => Ok(code),
            _ => Err(FactorialError::InvalidCallback(
                "authorization code is missing".to_string(),
            )),
        }
    }
}

/// Bound loopback socket waiting for a single authorization redirect.
///
/// The socket is owned by [`CallbackListener::wait_for_code`] and closed when
/// it returns, whatever the outcome.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Bind `host:port`, serving redirects on `path`.
    pub async fn bind(host: &str, port: u16, path: &str) -> Result<Self> {
        // `localhost` may resolve to ::1 first; browsers reliably reach 127.0.0.1.
        let host = if host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            host
        };
        let listener = TcpListener::bind((host, port)).await.map_err(|err| {
            FactorialError::Other(format!(
                "failed to bind callback listener on {host}:{port}: {err}"
            ))
        })?;
        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the redirect, the timeout, or `cancel`, whichever comes first.
    pub async fn wait_for_code<F>(
        self,
        expected_state: &str,
        timeout: Duration,
        cancel: F,
    ) -> Result<String>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, path } = self;
        log::debug!(
            "waiting up to {}s for authorization callback on {:?}",
            timeout.as_secs(),
            listener.local_addr().ok()
        );
        tokio::select! {
            outcome = tokio::time::timeout(timeout, accept_callback(&listener, &path, expected_state)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(FactorialError::CallbackTimeout(timeout)),
                }
            }
            _ = cancel => Err(FactorialError::Cancelled),
        }
    }
}

async fn accept_callback(listener: &TcpListener, path: &str, expected_state: &str) -> Result<String> {
    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("callback connection from {peer}");
        match handle_connection(stream, path, expected_state).await {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => continue,
            Err(err) => {
                log::warn!("ignoring unreadable callback request from {peer}: {err}");
                continue;
            }
        }
    }
}

/// Serve one connection; `None` means it was not the redirect and waiting continues.
async fn handle_connection(
    mut stream: TcpStream,
    path: &str,
    expected_state: &str,
) -> Result<Option<Result<String>>> {
    let head = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut stream)).await
    {
        Ok(head) => head?,
        Err(_) => return Ok(None),
    };
    let Some((method, target)) = parse_request_line(&head) else {
        write_response(&mut stream, 400, "Bad Request", "malformed request").await?;
        return Ok(None);
    };
    let (request_path, query) = target.split_once('?').unwrap_or((target, ""));
    if method != "GET" || request_path != path {
        write_response(&mut stream, 404, "Not Found", "not found").await?;
        return Ok(None);
    }

    let outcome = CallbackParams::from_query(query).into_code(expected_state);
    let (status, reason, message) = match &outcome {
        Ok(_) => (
            200,
            "OK",
            "SUCCESS. Authorization code received. You can close this window now",
        ),
        Err(FactorialError::StateMismatch) => (
            400,
            "Bad Request",
            "ERROR: invalid state parameter. Repeat login process",
        ),
        Err(FactorialError::AuthorizationDenied { .. }) => (
            200,
            "OK",
            "Authorization was denied. You can close this window now",
        ),
        Err(_) => (
            400,
            "Bad Request",
            "ERROR: authorization code is missing. Repeat login process",
        ),
    };
    if let Err(err) = write_response(&mut stream, status, reason, message).await {
        log::warn!("failed to answer authorization callback: {err}");
    }
    Ok(Some(outcome))
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.windows(4).any(|window| window == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES
        {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let first_line = head.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    Some((method, target))
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    message: &str,
) -> Result<()> {
    let body = format!("<html><body><b>{message}</b></body></html>");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
