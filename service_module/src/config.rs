use std::collections::HashSet;
use std::env;

use gmail_module::GmailAuthConfig;
use qbo_module::{QboAuthConfig, QboEnvironment};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// The address the agent sends replies from.
    pub agent_email: String,
    /// Lowercased sender addresses permitted to issue commands. Read-only
    /// for the process lifetime.
    pub authorized_senders: HashSet<String>,
    pub gmail: GmailAuthConfig,
    pub qbo: QboAuthConfig,
    pub qbo_realm_id: String,
    pub qbo_environment: QboEnvironment,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let agent_email = require("AGENT_EMAIL")?;

        let senders_raw = require("AUTHORIZED_EMAIL_SENDERS")?;
        let authorized_senders = parse_sender_list(&senders_raw);
        if authorized_senders.is_empty() {
            return Err(ConfigError::Invalid {
                key: "AUTHORIZED_EMAIL_SENDERS",
                value: senders_raw,
            });
        }

        let qbo_realm_id = require("QBO_REALM_ID")?;
        let environment_raw =
            env::var("QBO_ENVIRONMENT").unwrap_or_else(|_| "production".to_string());
        let qbo_environment =
            QboEnvironment::parse(&environment_raw).ok_or_else(|| ConfigError::Invalid {
                key: "QBO_ENVIRONMENT",
                value: environment_raw,
            })?;

        Ok(Self {
            host,
            port,
            agent_email,
            authorized_senders,
            gmail: GmailAuthConfig::from_env(),
            qbo: QboAuthConfig::from_env(),
            qbo_realm_id,
            qbo_environment,
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_sender_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}
