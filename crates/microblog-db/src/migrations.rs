use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            r#"
            CREATE TABLE "user" (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                about_me        TEXT,
                last_seen       TEXT NOT NULL
            );

            CREATE TABLE post (
                id          TEXT PRIMARY KEY,
                body        TEXT NOT NULL,
                user_id     TEXT NOT NULL REFERENCES "user"(id),
                timestamp   TEXT NOT NULL,
                language    TEXT
            );

            CREATE INDEX idx_post_timestamp ON post(timestamp);
            CREATE INDEX idx_post_user ON post(user_id, timestamp);

            -- The composite key makes a repeated follow a no-op.
            CREATE TABLE followers (
                follower_id TEXT NOT NULL REFERENCES "user"(id),
                followed_id TEXT NOT NULL REFERENCES "user"(id),
                PRIMARY KEY (follower_id, followed_id)
            );

            CREATE INDEX idx_followers_followed ON followers(followed_id);

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
