//! Typed REST client authorized through a [`CredentialProvider`].

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth::CredentialProvider;
use crate::config::ClientConfig;
use crate::error::{FactorialError, Result};

/// REST client rooted at `{base_url}/api/`.
///
/// Every request first asks the provider for a valid credential. A 401 gets
/// exactly one refresh and one retry; a second 401 is [`FactorialError::Unauthorized`].
#[derive(Debug)]
pub struct ApiClient<P> {
    http: Client,
    api_root: String,
    credentials: P,
}

impl<P: CredentialProvider> ApiClient<P> {
    /// Client for `base_url` built from `config`.
    pub fn new(base_url: &str, credentials: P, config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_client(config.http_client()?, base_url, credentials))
    }

    /// Client reusing an existing reqwest client.
    pub fn with_client(http: Client, base_url: &str, credentials: P) -> Self {
        Self {
            http,
            api_root: format!("{}/api", base_url.trim_end_matches('/')),
            credentials,
        }
    }

    /// The credential provider backing this client.
    pub fn credentials(&self) -> &P {
        &self.credentials
    }

    /// Absolute URL for a resource path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }

    /// GET `path` with optional query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.execute(Method::GET, path, query, None).await
    }

    /// POST a JSON body to `path`.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, path, &[], Some(&body)).await
    }

    /// PUT a JSON body to `path`.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.execute(Method::PUT, path, &[], Some(&body)).await
    }

    /// DELETE `path`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(Method::DELETE, path, &[], None).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let url = self.url(path);
        self.credentials.ensure_valid().await?;
        let header = self.credentials.authorization_header();
        let mut response = self.send(&method, &url, query, body, &header).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            log::debug!("{method} {url} answered 401; refreshing credentials once");
            self.credentials.refresh_after_unauthorized(&header).await?;
            let header = self.credentials.authorization_header();
            response = self.send(&method, &url, query, body, &header).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(FactorialError::Unauthorized);
            }
        }
        decode(response).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        credential: &str,
    ) -> Result<Response> {
        log::debug!("{method} {url}");
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json")
            .header(self.credentials.header_name(), credential);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(FactorialError::Api {
            status: status.as_u16(),
            body,
        });
    }
    // 204 and friends carry no body; let `()` and `Option` absorb it.
    let payload = if body.trim().is_empty() { "null" } else { body.as_str() };
    Ok(serde_json::from_str(payload)?)
}
