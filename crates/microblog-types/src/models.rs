use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The logged-in user as templates see it.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub about_me: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Author {
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub language: Option<String>,
    pub author: Author,
}

/// Everything the profile page shows above the user's posts.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub about_me: Option<String>,
    pub avatar: String,
    pub last_seen: DateTime<Utc>,
    pub followers: u64,
    pub following: u64,
    pub is_self: bool,
    pub is_following: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashMessage {
    pub kind: String,
    pub message: String,
}

impl FlashMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: "info".into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".into(),
            message: message.into(),
        }
    }
}
