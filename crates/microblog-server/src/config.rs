use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use microblog_api::state::AppConfig;

/// Secrets that ship in examples and must not sign real sessions.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Everything read from `MICROBLOG_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub app: AppConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();

        let port = match var("MICROBLOG_PORT") {
            Some(v) => v.parse().context("MICROBLOG_PORT must be a port number")?,
            None => 5000,
        };
        let posts_per_page = match var("MICROBLOG_POSTS_PER_PAGE") {
            Some(v) => v
                .parse::<u64>()
                .context("MICROBLOG_POSTS_PER_PAGE must be a positive integer")?
                .max(1),
            None => defaults.posts_per_page,
        };
        let reset_token_ttl_secs = match var("MICROBLOG_RESET_TOKEN_TTL_SECS") {
            Some(v) => v
                .parse()
                .context("MICROBLOG_RESET_TOKEN_TTL_SECS must be a number of seconds")?,
            None => defaults.reset_token_ttl_secs,
        };

        let secret_key = var("MICROBLOG_SECRET_KEY").unwrap_or(defaults.secret_key);
        if PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            warn!("MICROBLOG_SECRET_KEY is unset or a placeholder; sessions are forgeable");
        }

        Ok(Self {
            host: var("MICROBLOG_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("MICROBLOG_DB_PATH")
                .unwrap_or_else(|| "microblog.db".into())
                .into(),
            mail_api_url: var("MICROBLOG_MAIL_API_URL"),
            mail_api_key: var("MICROBLOG_MAIL_API_KEY"),
            app: AppConfig {
                secret_key,
                posts_per_page,
                base_url: var("MICROBLOG_BASE_URL").unwrap_or(defaults.base_url),
                reset_token_ttl_secs,
                secure_cookies: var("MICROBLOG_SECURE_COOKIES")
                    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(defaults.secure_cookies),
                mail_sender: var("MICROBLOG_MAIL_SENDER").unwrap_or(defaults.mail_sender),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:5000");
        assert_eq!(config.db_path, PathBuf::from("microblog.db"));
        assert_eq!(config.app.posts_per_page, 10);
        assert_eq!(config.app.reset_token_ttl_secs, 600);
        assert!(!config.app.secure_cookies);
        assert!(config.mail_api_url.is_none());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("MICROBLOG_PORT", "8080"),
            ("MICROBLOG_POSTS_PER_PAGE", "25"),
            ("MICROBLOG_SECURE_COOKIES", "true"),
            ("MICROBLOG_SECRET_KEY", "s3cret"),
            ("MICROBLOG_MAIL_API_URL", "https://mail.example/send"),
            ("MICROBLOG_BASE_URL", ""),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.app.posts_per_page, 25);
        assert!(config.app.secure_cookies);
        assert_eq!(config.app.secret_key, "s3cret");
        assert_eq!(config.mail_api_url.as_deref(), Some("https://mail.example/send"));
        assert_eq!(config.app.base_url, "http://localhost:5000");
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("MICROBLOG_PORT", "eighty")]).is_err());
        assert!(config(&[("MICROBLOG_POSTS_PER_PAGE", "-3")]).is_err());
        assert_eq!(
            config(&[("MICROBLOG_POSTS_PER_PAGE", "0")]).unwrap().app.posts_per_page,
            1
        );
    }
}
