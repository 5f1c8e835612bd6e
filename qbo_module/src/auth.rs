//! OAuth 2.0 token management for the accounting API.
//!
//! The accounting service authenticates refresh-token grants with an HTTP
//! Basic header and may rotate the refresh token on every exchange, so a
//! rotated token in the response replaces the stored one.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

const REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct QboAuth {
    inner: Arc<RwLock<AuthInner>>,
}

#[derive(Debug)]
struct AuthInner {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_url: String,
    access_token: Option<String>,
    token_expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct QboAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Pre-generated access token (for tests and sandbox environments).
    pub access_token: Option<String>,
}

impl QboAuthConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("QBO_CLIENT_ID").ok(),
            client_secret: std::env::var("QBO_CLIENT_SECRET").ok(),
            refresh_token: std::env::var("QBO_REFRESH_TOKEN").ok(),
            access_token: std::env::var("QBO_ACCESS_TOKEN").ok(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QboAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("json error: {0}")]
    Json(String),
}

impl QboAuth {
    pub fn new(config: QboAuthConfig) -> Result<Self, QboAuthError> {
        if !config.is_valid() {
            return Err(QboAuthError::MissingCredentials(
                "Either QBO_ACCESS_TOKEN or (QBO_CLIENT_ID + QBO_CLIENT_SECRET + QBO_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        let (access_token, token_expires_at) = match config.access_token {
            Some(token) => (Some(token), Some(Instant::now() + Duration::from_secs(3600))),
            None => (None, None),
        };

        let token_url =
            std::env::var("QBO_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string());

        Ok(Self {
            inner: Arc::new(RwLock::new(AuthInner {
                client_id: config.client_id.unwrap_or_default(),
                client_secret: config.client_secret.unwrap_or_default(),
                refresh_token: config.refresh_token.unwrap_or_default(),
                token_url,
                access_token,
                token_expires_at,
            })),
        })
    }

    pub fn from_env() -> Result<Self, QboAuthError> {
        Self::new(QboAuthConfig::from_env())
    }

    pub fn get_access_token(&self) -> Result<String, QboAuthError> {
        {
            let inner = self.inner.read().unwrap();
            if let (Some(token), Some(expires_at)) =
                (&inner.access_token, &inner.token_expires_at)
            {
                if *expires_at > Instant::now() + REFRESH_MARGIN {
                    return Ok(token.clone());
                }
            }
        }
        self.force_refresh()
    }

    pub fn force_refresh(&self) -> Result<String, QboAuthError> {
        let (client_id, client_secret, refresh_token, token_url) = {
            let inner = self.inner.read().unwrap();
            if inner.client_id.is_empty()
                || inner.client_secret.is_empty()
                || inner.refresh_token.is_empty()
            {
                return Err(QboAuthError::MissingCredentials(
                    "no refresh credentials available".to_string(),
                ));
            }
            (
                inner.client_id.clone(),
                inner.client_secret.clone(),
                inner.refresh_token.clone(),
                inner.token_url.clone(),
            )
        };

        debug!("refreshing accounting OAuth token");

        let basic = BASE64_STANDARD.encode(format!("{}:{}", client_id, client_secret));
        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&token_url)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .map_err(|e| QboAuthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            error!("accounting token refresh failed: {} - {}", status, body);
            return Err(QboAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| QboAuthError::Json(e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(token_response.expires_in.max(0) as u64);
        let access_token = token_response.access_token.clone();

        {
            let mut inner = self.inner.write().unwrap();
            inner.access_token = Some(token_response.access_token);
            inner.token_expires_at = Some(expires_at);
            if let Some(rotated) = token_response.refresh_token {
                info!("accounting service rotated the refresh token");
                inner.refresh_token = rotated;
            }
        }

        debug!("accounting OAuth token refreshed");
        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}
