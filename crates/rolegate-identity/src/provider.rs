//! External identity-provider client.
//!
//! The provider exposes one endpoint: `GET <base>/account.json` with a
//! bearer token. A 2xx response carries `{sub, name, email}`, all
//! required. A 401 is a recoverable "forbidden" outcome, modeled as a
//! value rather than an error so it can be cached negatively; any
//! other non-2xx status is fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{IdentityError, IdentityResult};

/// Account info returned by the provider on success. All fields are
/// required; a well-formed body missing any of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    /// Stable subject id, used to key participants.
    pub sub: String,
    pub name: String,
    pub email: String,
}

/// Outcome of a provider lookup. `Forbidden` only becomes a denial
/// when the caller retrieves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Account(AccountInfo),
    Forbidden { message: String },
}

/// Provider abstraction; tests substitute mocks.
#[async_trait]
pub trait AccountProvider: Send + Sync + 'static {
    async fn account_info(&self, token: &str) -> IdentityResult<ProviderOutcome>;
}

/// reqwest-backed provider client.
pub struct HttpAccountProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> IdentityResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ForbiddenBody {
    message: Option<String>,
}

#[async_trait]
impl AccountProvider for HttpAccountProvider {
    async fn account_info(&self, token: &str) -> IdentityResult<ProviderOutcome> {
        let url = format!("{}/account.json", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let body: ForbiddenBody = response
                .json()
                .await
                .unwrap_or(ForbiddenBody { message: None });
            return Ok(ProviderOutcome::Forbidden {
                message: body.message.unwrap_or_else(|| "Invalid Token".to_string()),
            });
        }
        if !status.is_success() {
            return Err(IdentityError::ProviderStatus {
                status: status.as_u16(),
            });
        }

        // Decode in two steps so a well-formed body with missing
        // fields surfaces as MalformedResponse, not a transport error.
        let body: serde_json::Value = response.json().await?;
        let account: AccountInfo =
            serde_json::from_value(body).map_err(|e| IdentityError::MalformedResponse {
                message: e.to_string(),
            })?;
        Ok(ProviderOutcome::Account(account))
    }
}
