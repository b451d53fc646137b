//! HTTP client for the identity provider.
//!
//! Every operation is a JSON POST with the project API key in the `key`
//! query parameter. Token lifetimes arrive as decimal strings.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::validate_lifetime;
use crate::config::Config;

use super::provider::{AuthGrant, IdentityProvider, RefreshGrant};
use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Endpoint URLs for the identity provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sign_up: String,
    pub sign_in: String,
    pub change_password: String,
    pub refresh_token: String,
}

impl From<&Config> for Endpoints {
    fn from(config: &Config) -> Self {
        Self {
            sign_up: config.sign_up_url.clone(),
            sign_in: config.sign_in_url.clone(),
            change_password: config.change_password_url.clone(),
            refresh_token: config.refresh_token_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    id_token: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    email: String,
    local_id: String,
    id_token: String,
    expires_in: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    expires_in: String,
    refresh_token: String,
}

fn parse_expires_in(value: &str) -> Result<i64, ApiError> {
    let seconds = value
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::InvalidResponse(format!("Invalid token lifetime: {:?}", value)))?;
    validate_lifetime(seconds).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

impl TryFrom<AuthResponse> for AuthGrant {
    type Error = ApiError;

    fn try_from(response: AuthResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            expires_in: parse_expires_in(&response.expires_in)?,
            email: response.email,
            user_id: response.local_id,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        })
    }
}

impl TryFrom<RefreshResponse> for RefreshGrant {
    type Error = ApiError;

    fn try_from(response: RefreshResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            expires_in: parse_expires_in(&response.expires_in)?,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        })
    }
}

/// Identity provider client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    api_key: String,
    endpoints: Endpoints,
}

impl IdentityClient {
    pub fn new(api_key: impl Into<String>, endpoints: Endpoints) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoints,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .context("No API key configured (set POSTBOARD_API_KEY or api_key in config.json)")?;
        Self::new(api_key, Endpoints::from(config))
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> &str {
        match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
            Some((index, _)) => &body[..index],
            None => body,
        }
    }

    /// Check if response is successful, mapping the provider's error body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = Self::truncate_body(&body), "Identity request failed");
        Err(ApiError::from_body(&body))
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url, "Sending identity request");

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn authenticate<B: Serialize>(&self, url: &str, body: &B) -> Result<AuthGrant, ApiError> {
        let response: AuthResponse = self.post(url, body).await?;
        AuthGrant::try_from(response)
    }
}

impl IdentityProvider for IdentityClient {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        async move {
            let body = CredentialsRequest {
                email,
                password,
                return_secure_token: true,
            };
            self.authenticate(&self.endpoints.sign_up, &body).await
        }
        .boxed()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        async move {
            let body = CredentialsRequest {
                email,
                password,
                return_secure_token: true,
            };
            self.authenticate(&self.endpoints.sign_in, &body).await
        }
        .boxed()
    }

    fn change_password<'a>(
        &'a self,
        id_token: &'a str,
        new_password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        async move {
            let body = ChangePasswordRequest {
                id_token,
                password: new_password,
                return_secure_token: true,
            };
            self.authenticate(&self.endpoints.change_password, &body).await
        }
        .boxed()
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<RefreshGrant, ApiError>> {
        async move {
            let body = RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            };
            let response: RefreshResponse = self.post(&self.endpoints.refresh_token, &body).await?;
            RefreshGrant::try_from(response)
        }
        .boxed()
    }
}
