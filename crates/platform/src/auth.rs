//! UAA password-grant login with an in-memory bearer token cache.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use herald_common::error::RemoteError;
use herald_common::http::decode_response;

/// Refresh this long before the token's declared expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(600);

/// Static credentials passed through to the platform's UAA.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    token_endpoint: Option<String>,
    #[serde(default)]
    authorization_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct Authenticator {
    http: reqwest::Client,
    api_url: String,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    pub fn new(http: reqwest::Client, api_url: String, credentials: Credentials) -> Self {
        Self {
            http,
            api_url,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, logging in again when the cached one is stale.
    pub async fn token(&self) -> Result<String, RemoteError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.login().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call logs in again.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn login(&self) -> Result<CachedToken, RemoteError> {
        let endpoint = self.token_endpoint().await?;

        let response = self
            .http
            .post(format!("{}/oauth/token", endpoint.trim_end_matches('/')))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RemoteError::transport("authenticate", e))?;

        let token: TokenResponse = decode_response("authenticate", response).await?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        tracing::info!(
            username = %self.credentials.username,
            expires_in_secs = lifetime.as_secs(),
            "Authenticated with UAA"
        );

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        })
    }

    async fn token_endpoint(&self) -> Result<String, RemoteError> {
        let response = self
            .http
            .get(format!("{}/v2/info", self.api_url))
            .send()
            .await
            .map_err(|e| RemoteError::transport("discover_auth", e))?;

        let info: InfoResponse = decode_response("discover_auth", response).await?;
        info.token_endpoint
            .or(info.authorization_endpoint)
            .ok_or_else(|| RemoteError::Api {
                operation: "discover_auth",
                code: "no token_endpoint or authorization_endpoint in /v2/info".to_string(),
            })
    }
}
