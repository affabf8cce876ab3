use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use microblog_db::models::UserRow;

use crate::state::AppConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// Writes outgoing mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Outgoing mail:\n{}", email.text);
        Ok(())
    }
}

/// Delivers mail by POSTing it as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
            .send()
            .await
            .context("mail relay unreachable")?
            .error_for_status()
            .context("mail relay rejected message")?;
        info!(to = %email.to, "Mail delivered to relay");
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests to read reset links.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> Result<()> {
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("mailbox lock poisoned: {}", e))?
            .push(email);
        Ok(())
    }
}

pub fn reset_link(config: &AppConfig, token: &str) -> String {
    format!(
        "{}/reset_password/{}",
        config.base_url.trim_end_matches('/'),
        token
    )
}

pub fn password_reset_email(config: &AppConfig, user: &UserRow, token: &str) -> Email {
    let text = format!(
        "Dear {},\n\n\
         To reset your password click on the following link:\n\n\
         {}\n\n\
         If you have not requested a password reset simply ignore this message.\n\n\
         Sincerely,\n\n\
         The Microblog Team\n",
        user.username,
        reset_link(config, token)
    );

    Email {
        from: config.mail_sender.clone(),
        to: user.email.clone(),
        subject: "[Microblog] Reset Your Password".into(),
        text,
    }
}
