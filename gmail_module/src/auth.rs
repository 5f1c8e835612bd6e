//! OAuth 2.0 token management for the mailbox API.
//!
//! Exchanges a long-lived refresh token for short-lived access tokens and
//! caches the result in-process until shortly before expiry.

use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Mailbox OAuth credentials and cached access token.
#[derive(Debug, Clone)]
pub struct GmailAuth {
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

/// Configuration for the mailbox OAuth flow.
#[derive(Debug, Clone, Default)]
pub struct GmailAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Pre-generated access token (for tests and sandbox environments
    /// without network access).
    pub access_token: Option<String>,
}

impl GmailAuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("GMAIL_CLIENT_ID").ok(),
            client_secret: std::env::var("GMAIL_CLIENT_SECRET").ok(),
            refresh_token: std::env::var("GMAIL_REFRESH_TOKEN").ok(),
            access_token: std::env::var("GMAIL_ACCESS_TOKEN").ok(),
        }
    }

    /// Check that the configuration carries enough to authenticate.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GmailAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("json error: {0}")]
    Json(String),
}

impl GmailAuth {
    /// Create a new auth handle from configuration.
    pub fn new(config: GmailAuthConfig) -> Result<Self, GmailAuthError> {
        if !config.is_valid() {
            return Err(GmailAuthError::MissingCredentials(
                "Either GMAIL_ACCESS_TOKEN or (GMAIL_CLIENT_ID + GMAIL_CLIENT_SECRET + GMAIL_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        // A pre-generated token is assumed valid for one hour.
        let (access_token, token_expires_at) = match config.access_token {
            Some(token) => (Some(token), Some(Instant::now() + Duration::from_secs(3600))),
            None => (None, None),
        };

        let token_url =
            std::env::var("GMAIL_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string());

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

    pub fn from_env() -> Result<Self, GmailAuthError> {
        Self::new(GmailAuthConfig::from_env())
    }

    /// Get a valid access token, refreshing if the cached one is missing or
    /// inside the refresh margin.
    pub fn get_access_token(&self) -> Result<String, GmailAuthError> {
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

    /// Refresh the access token unconditionally. Callers use this for the
    /// single retry after a 401 from a downstream call.
    pub fn force_refresh(&self) -> Result<String, GmailAuthError> {
        let (client_id, client_secret, refresh_token, token_url) = {
            let inner = self.inner.read().unwrap();
            if inner.client_id.is_empty()
                || inner.client_secret.is_empty()
                || inner.refresh_token.is_empty()
            {
                return Err(GmailAuthError::MissingCredentials(
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

        debug!("refreshing mailbox OAuth token");

        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .map_err(|e| GmailAuthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            error!("mailbox token refresh failed: {} - {}", status, body);
            return Err(GmailAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| GmailAuthError::Json(e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(token_response.expires_in.max(0) as u64);
        let access_token = token_response.access_token.clone();

        {
            let mut inner = self.inner.write().unwrap();
            inner.access_token = Some(token_response.access_token);
            inner.token_expires_at = Some(expires_at);
        }

        debug!("mailbox OAuth token refreshed");
        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        let empty = GmailAuthConfig::default();
        assert!(!empty.is_valid());

        let oauth = GmailAuthConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            refresh_token: Some("refresh".to_string()),
            access_token: None,
        };
        assert!(oauth.is_valid());

        let pregenerated = GmailAuthConfig {
            access_token: Some("token".to_string()),
            ..Default::default()
        };
        assert!(pregenerated.is_valid());
    }

    #[test]
    fn pregenerated_token_is_served_from_cache() {
        let auth = GmailAuth::new(GmailAuthConfig {
            access_token: Some("cached-token".to_string()),
            ..Default::default()
        })
        .expect("auth");
        assert_eq!(auth.get_access_token().expect("token"), "cached-token");
    }

    #[test]
    fn force_refresh_without_credentials_fails() {
        let auth = GmailAuth::new(GmailAuthConfig {
            access_token: Some("cached-token".to_string()),
            ..Default::default()
        })
        .expect("auth");
        assert!(matches!(
            auth.force_refresh(),
            Err(GmailAuthError::MissingCredentials(_))
        ));
    }
}
