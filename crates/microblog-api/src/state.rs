use std::sync::Arc;

use tracing::error;

use microblog_db::Database;

use crate::error::AppError;
use crate::mail::Mailer;
use crate::templates::Templates;

pub type AppState = Arc<AppStateInner>;

/// Settings the handlers need at request time. Loaded from the environment
/// by the server binary; `Default` gives development values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub secret_key: String,
    pub posts_per_page: u64,
    /// Absolute origin used to build links in outgoing email.
    pub base_url: String,
    pub reset_token_ttl_secs: i64,
    pub secure_cookies: bool,
    pub mail_sender: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            secret_key: "dev-secret-change-me".into(),
            posts_per_page: microblog_types::pagination::DEFAULT_PAGE_SIZE,
            base_url: "http://localhost:5000".into(),
            reset_token_ttl_secs: 600,
            secure_cookies: false,
            mail_sender: "noreply@microblog.local".into(),
        }
    }
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: AppConfig,
    pub templates: Templates,
    pub mailer: Arc<dyn Mailer>,
}

impl AppStateInner {
    pub fn new(db: Database, config: AppConfig, mailer: Arc<dyn Mailer>) -> anyhow::Result<AppState> {
        Ok(Arc::new(Self {
            db: Arc::new(db),
            config,
            templates: Templates::new()?,
            mailer,
        }))
    }

    /// Run blocking database work (and password hashing) off the async runtime.
    pub async fn db<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Database) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                AppError::Internal(anyhow::anyhow!("blocking task failed: {e}"))
            })?
    }
}
