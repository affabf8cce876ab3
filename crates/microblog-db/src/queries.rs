use crate::models::{NewPost, PostRow, UserRow};
use crate::Database;
use anyhow::Result;
use microblog_types::pagination::{Page, PageRequest};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

/// Which posts a timeline shows. All three share one paginated query.
#[derive(Debug, Clone, Copy)]
pub enum Feed<'a> {
    /// Posts by the users `follower_id` follows.
    Followed { follower_id: &'a str },
    /// Every post.
    Explore,
    /// Posts by one author.
    Author { user_id: &'a str },
}

impl Feed<'_> {
    fn join_clause(&self) -> &'static str {
        match self {
            Feed::Followed { .. } => "JOIN followers f ON f.followed_id = p.user_id",
            Feed::Explore | Feed::Author { .. } => "",
        }
    }

    fn where_clause(&self) -> &'static str {
        match self {
            Feed::Followed { .. } => "WHERE f.follower_id = ?",
            Feed::Author { .. } => "WHERE p.user_id = ?",
            Feed::Explore => "",
        }
    }

    fn param(&self) -> Option<&str> {
        match self {
            Feed::Followed { follower_id } => Some(*follower_id),
            Feed::Author { user_id } => Some(*user_id),
            Feed::Explore => None,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, about_me, last_seen";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                r#"INSERT INTO "user" (id, username, email, password_hash, last_seen)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                (id, username, email, password_hash, now),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    /// Any existing user holding either the username or the email.
    pub fn find_user_conflict(&self, username: &str, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                r#"SELECT {USER_COLUMNS} FROM "user" WHERE username = ?1 OR email = ?2 LIMIT 1"#
            );
            conn.query_row(&sql, (username, email), user_from_row)
                .optional()
        })
    }

    pub fn update_last_seen(&self, id: &str, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                r#"UPDATE "user" SET last_seen = ?1 WHERE id = ?2"#,
                (now, id),
            )?;
            Ok(())
        })
    }

    pub fn update_profile(&self, id: &str, username: &str, about_me: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                r#"UPDATE "user" SET username = ?1, about_me = ?2 WHERE id = ?3"#,
                (username, about_me, id),
            )?;
            Ok(())
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                r#"UPDATE "user" SET password_hash = ?1 WHERE id = ?2"#,
                (password_hash, id),
            )?;
            Ok(())
        })
    }

    // -- Posts --

    pub fn insert_post(&self, post: &NewPost<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO post (id, body, user_id, timestamp, language) VALUES (?1, ?2, ?3, ?4, ?5)",
                (post.id, post.body, post.user_id, post.timestamp, post.language),
            )?;
            Ok(())
        })
    }

    /// One page of a timeline, newest first, plus the total for the same
    /// filter. Both queries run under the same lock.
    pub fn feed_page(&self, feed: Feed<'_>, request: PageRequest) -> Result<Page<PostRow>> {
        self.with_conn(|conn| {
            let total = count_feed(conn, feed)?;
            let posts = query_feed(conn, feed, request)?;
            Ok(Page::new(request, posts, total))
        })
    }

    // -- Followers --

    /// Returns true if a new edge was created.
    pub fn follow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
                (follower_id, followed_id),
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if an edge was removed.
    pub fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                (follower_id, followed_id),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn is_following(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM followers WHERE follower_id = ?1 AND followed_id = ?2)",
                (follower_id, followed_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn followers_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM followers WHERE followed_id = ?1", user_id)
        })
    }

    pub fn following_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM followers WHERE follower_id = ?1", user_id)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        about_me: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(r#"SELECT {USER_COLUMNS} FROM "user" WHERE {predicate}"#);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], user_from_row).optional()
}

fn count(conn: &Connection, sql: &str, param: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [param], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn count_feed(conn: &Connection, feed: Feed<'_>) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM post p {} {}",
        feed.join_clause(),
        feed.where_clause()
    );
    let param = feed.param();
    let params: Vec<&dyn ToSql> = param.iter().map(|p| p as &dyn ToSql).collect();
    let n: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn query_feed(conn: &Connection, feed: Feed<'_>, request: PageRequest) -> Result<Vec<PostRow>> {
    // JOIN the author so each post renders without a second lookup
    let sql = format!(
        r#"SELECT p.id, p.body, p.user_id, p.timestamp, p.language, u.username, u.email
           FROM post p
           JOIN "user" u ON u.id = p.user_id
           {}
           {}
           ORDER BY p.timestamp DESC, p.rowid DESC
           LIMIT ? OFFSET ?"#,
        feed.join_clause(),
        feed.where_clause()
    );

    let limit = i64::try_from(request.per_page()).unwrap_or(i64::MAX);
    let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);

    let param = feed.param();
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(3);
    if let Some(p) = &param {
        params.push(p);
    }
    params.push(&limit);
    params.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(PostRow {
                id: row.get(0)?,
                body: row.get(1)?,
                user_id: row.get(2)?,
                timestamp: row.get(3)?,
                language: row.get(4)?,
                author_username: row.get(5)?,
                author_email: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
