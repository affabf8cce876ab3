use axum::{
    Extension,
    extract::{Path, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use microblog_db::Database;
use microblog_db::models::UserRow;
use microblog_types::api::EmptyForm;
use microblog_types::models::FlashMessage;

use crate::csrf::CsrfForm;
use crate::error::AppError;
use crate::flash;
use crate::middleware::RequestContext;
use crate::state::AppState;

fn find_target(db: &Database, username: &str) -> Result<UserRow, AppError> {
    db.get_user_by_username(username)?
        .ok_or_else(|| AppError::not_found(format!("User {username}")))
}

/// Make `actor` follow `target_username`. Following someone twice is a
/// no-op. Returns true if a new edge was created.
pub fn follow(db: &Database, actor: &UserRow, target_username: &str) -> Result<bool, AppError> {
    if actor.username == target_username {
        return Err(AppError::SelfFollow);
    }
    let target = find_target(db, target_username)?;
    if target.id == actor.id {
        return Err(AppError::SelfFollow);
    }
    Ok(db.follow(&actor.id, &target.id)?)
}

/// Remove the edge if present. Returns true if one was removed.
pub fn unfollow(db: &Database, actor: &UserRow, target_username: &str) -> Result<bool, AppError> {
    let target = find_target(db, target_username)?;
    Ok(db.unfollow(&actor.id, &target.id)?)
}

fn profile_path(username: &str) -> String {
    format!("/user/{}", urlencoding::encode(username))
}

pub async fn follow_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(username): Path<String>,
    jar: CookieJar,
    CsrfForm(_form): CsrfForm<EmptyForm>,
) -> Result<Response, AppError> {
    let actor = ctx.require_user()?.clone();
    let target = username.clone();
    let result = state.db(move |db| follow(db, &actor, &target)).await;

    match result {
        Ok(created) => {
            if created {
                info!("{} now follows {}", ctx.require_user()?.username, username);
            }
            Ok(flash::redirect(
                jar,
                &profile_path(&username),
                FlashMessage::info(format!("You are following {username}!")),
            ))
        }
        Err(e @ AppError::NotFound(_)) => Ok(flash::redirect(jar, "/index", e.flash())),
        Err(e) if e.is_user_facing() => Ok(flash::redirect(jar, &profile_path(&username), e.flash())),
        Err(e) => Err(e),
    }
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(username): Path<String>,
    jar: CookieJar,
    CsrfForm(_form): CsrfForm<EmptyForm>,
) -> Result<Response, AppError> {
    let actor = ctx.require_user()?.clone();
    if actor.username == username {
        return Ok(flash::redirect(
            jar,
            &profile_path(&username),
            FlashMessage::error("You cannot unfollow yourself!"),
        ));
    }

    let target = username.clone();
    match state.db(move |db| unfollow(db, &actor, &target)).await {
        Ok(removed) => {
            if removed {
                info!("{} unfollowed {}", ctx.require_user()?.username, username);
            }
            Ok(flash::redirect(
                jar,
                &profile_path(&username),
                FlashMessage::info(format!("You are not following {username}.")),
            ))
        }
        Err(e @ AppError::NotFound(_)) => Ok(flash::redirect(jar, "/index", e.flash())),
        Err(e) if e.is_user_facing() => Ok(flash::redirect(jar, &profile_path(&username), e.flash())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microblog_db::now_timestamp;

    fn db_with(names: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for name in names {
            db.create_user(name, name, &format!("{name}@example.com"), "x", &now_timestamp())
                .unwrap();
        }
        db
    }

    fn user(db: &Database, name: &str) -> UserRow {
        db.get_user_by_username(name).unwrap().unwrap()
    }

    #[test]
    fn follow_is_idempotent() {
        let db = db_with(&["alice", "bob"]);
        let alice = user(&db, "alice");

        assert!(follow(&db, &alice, "bob").unwrap());
        assert!(!follow(&db, &alice, "bob").unwrap());
        assert_eq!(db.followers_count("bob").unwrap(), 1);
    }

    #[test]
    fn self_follow_is_rejected() {
        let db = db_with(&["alice"]);
        let alice = user(&db, "alice");

        assert!(matches!(follow(&db, &alice, "alice"), Err(AppError::SelfFollow)));
        assert_eq!(db.following_count("alice").unwrap(), 0);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let db = db_with(&["alice"]);
        let alice = user(&db, "alice");

        assert!(matches!(follow(&db, &alice, "ghost"), Err(AppError::NotFound(_))));
        assert!(matches!(unfollow(&db, &alice, "ghost"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn unfollow_without_edge_is_noop() {
        let db = db_with(&["alice", "bob"]);
        let alice = user(&db, "alice");

        assert!(!unfollow(&db, &alice, "bob").unwrap());
        follow(&db, &alice, "bob").unwrap();
        assert!(unfollow(&db, &alice, "bob").unwrap());
        assert!(!db.is_following(&alice.id, &user(&db, "bob").id).unwrap());
    }
}
