use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use mailmart_types::models::UserId;

/// Placeholder bridge tokens that MUST NOT be used.
pub const PLACEHOLDER_TOKENS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-token-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub admin_id: UserId,
    pub bridge_token: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub channel_link: Option<String>,
    pub max_credit: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let admin_id = var("MAILMART_ADMIN_ID")
            .context("MAILMART_ADMIN_ID is not set")?
            .trim()
            .parse()
            .context("MAILMART_ADMIN_ID must be a numeric user id")?;

        let port = match var("MAILMART_PORT") {
            Some(v) => v.trim().parse().context("MAILMART_PORT must be a port number")?,
            None => 3300,
        };

        let max_credit = match var("MAILMART_MAX_CREDIT") {
            Some(v) => {
                let max: i64 = v.trim().parse().context("MAILMART_MAX_CREDIT must be an integer")?;
                if max <= 0 {
                    bail!("MAILMART_MAX_CREDIT must be greater than zero");
                }
                Some(max)
            }
            None => None,
        };

        Ok(Self {
            admin_id,
            bridge_token: var("MAILMART_BRIDGE_TOKEN").unwrap_or_default(),
            db_path: var("MAILMART_DB_PATH")
                .unwrap_or_else(|| "mailmart.db".into())
                .into(),
            host: var("MAILMART_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            channel_link: var("MAILMART_CHANNEL_LINK"),
            max_credit,
        })
    }

    /// False when the bridge token is unset or still a placeholder.
    pub fn bridge_token_is_usable(&self) -> bool {
        !self.bridge_token.is_empty() && !PLACEHOLDER_TOKENS.contains(&self.bridge_token.as_str())
    }
}
