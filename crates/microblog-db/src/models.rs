/// Database row types. Each maps directly to a SQLite row.
/// Distinct from microblog-types view models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub about_me: Option<String>,
    pub last_seen: String,
}

/// A post joined with the author columns every feed needs.
#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: String,
    pub body: String,
    pub user_id: String,
    pub timestamp: String,
    pub language: Option<String>,
    pub author_username: String,
    pub author_email: String,
}

pub struct NewPost<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub body: &'a str,
    pub timestamp: &'a str,
    pub language: Option<&'a str>,
}
