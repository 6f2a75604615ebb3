//! Resource records and endpoint wrappers.

use serde::{Deserialize, Serialize};

use crate::auth::CredentialProvider;
use crate::client::ApiClient;
use crate::error::Result;

/// Resource path of the public-API credentials endpoint.
pub const CREDENTIALS_PATH: &str = "2025-01-01/resources/api_public/credentials";

/// Pagination metadata returned next to list payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Page size.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Total number of records.
    #[serde(default)]
    pub total: Option<u64>,
    /// Whether another page follows.
    #[serde(default)]
    pub has_next_page: bool,
    /// Whether a page precedes this one.
    #[serde(default)]
    pub has_previous_page: bool,
    /// Cursor of the first record on this page.
    #[serde(default)]
    pub start_cursor: Option<String>,
    /// Cursor of the last record on this page.
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// `{data, meta}` list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records on this page.
    pub data: Vec<T>,
    /// Pagination metadata.
    #[serde(default)]
    pub meta: Meta,
}

/// Identity and company details behind the current credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Company the credential belongs to.
    pub company_id: u64,
    /// Credential id.
    pub id: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Email used to sign in.
    #[serde(default)]
    pub login_email: Option<String>,
    /// Full name of the user.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Absent when the request was made with an API key.
    #[serde(default)]
    pub employee_id: Option<u64>,
    /// Role within the company.
    #[serde(default)]
    pub role: Option<String>,
    /// Company legal name.
    #[serde(default)]
    pub legal_name: Option<String>,
    /// Preferred locale.
    #[serde(default)]
    pub locale: Option<String>,
    /// Company display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Company subscription plan.
    #[serde(default)]
    pub subscription_plan: Option<String>,
}

impl Credentials {
    /// Best label for the user: full name, then email, then id.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.login_email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// `api_public/credentials` endpoint.
pub struct CredentialsEndpoint<'a, P> {
    api: &'a ApiClient<P>,
}

impl<'a, P: CredentialProvider> CredentialsEndpoint<'a, P> {
    /// Endpoint bound to `api`.
    pub fn new(api: &'a ApiClient<P>) -> Self {
        Self { api }
    }

    /// First page of credentials together with its metadata.
    pub async fn list(&self) -> Result<Page<Credentials>> {
        self.api.get(CREDENTIALS_PATH, &[]).await
    }

    /// Credentials of the authenticated user, if the provider returned any.
    pub async fn current(&self) -> Result<Option<Credentials>> {
        Ok(self.list().await?.data.into_iter().next())
    }
}
