use axum::{
    Extension,
    extract::{Path, Query, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;
use tracing::{info, warn};

use microblog_db::models::UserRow;
use microblog_db::{Database, is_unique_violation, parse_timestamp};
use microblog_types::api::{EditProfileForm, PageQuery, Validate};
use microblog_types::models::{FlashMessage, ProfileView};
use microblog_types::pagination::PageRequest;

use crate::csrf::CsrfForm;
use crate::error::AppError;
use crate::feed::user_feed;
use crate::flash;
use crate::middleware::RequestContext;
use crate::state::AppState;
use crate::templates::{AVATAR_PROFILE_SIZE, avatar_url};

/// Header of `username`'s profile page as seen by `viewer`.
pub fn profile_view(db: &Database, viewer: &UserRow, username: &str) -> Result<ProfileView, AppError> {
    let user = db
        .get_user_by_username(username)?
        .ok_or_else(|| AppError::not_found(format!("User {username}")))?;

    let last_seen = parse_timestamp(&user.last_seen).unwrap_or_else(|e| {
        warn!("Corrupt last_seen '{}' for user {}: {}", user.last_seen, user.username, e);
        chrono::DateTime::default()
    });

    Ok(ProfileView {
        avatar: avatar_url(&user.email, AVATAR_PROFILE_SIZE),
        last_seen,
        followers: db.followers_count(&user.id)?,
        following: db.following_count(&user.id)?,
        is_self: user.id == viewer.id,
        is_following: db.is_following(&viewer.id, &user.id)?,
        about_me: user.about_me,
        username: user.username,
    })
}

/// Change the username and about-me text of `user`. The new username must
/// not belong to anyone else. Blank about-me text clears it.
pub fn edit_profile(db: &Database, user: &UserRow, form: &EditProfileForm) -> Result<(), AppError> {
    form.validate()?;

    if form.username != user.username && db.get_user_by_username(&form.username)?.is_some() {
        return Err(AppError::DuplicateUser);
    }

    let about_me = Some(form.about_me.trim()).filter(|s| !s.is_empty());
    db.update_profile(&user.id, &form.username, about_me)
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateUser
            } else {
                AppError::Internal(e)
            }
        })
}

// -- Handlers --

pub async fn user_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let viewer = ctx.require_user()?.clone();
    let request = PageRequest::new(query.page(), state.config.posts_per_page);

    let (profile, page) = state
        .db(move |db| {
            let profile = profile_view(db, &viewer, &username)?;
            let page = user_feed(db, &username, request)?;
            Ok((profile, page))
        })
        .await?;

    let mut context = Context::new();
    context.insert("title", &profile.username);
    context.insert("profile", &profile);
    context.insert("page", &page);
    context.insert(
        "page_url",
        &format!("/user/{}", urlencoding::encode(&profile.username)),
    );
    state.templates.page("user.html", &ctx, jar, context)
}

pub async fn edit_profile_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let user = ctx.require_user()?;

    let mut context = Context::new();
    context.insert("title", "Edit Profile");
    context.insert("username", &user.username);
    context.insert("about_me", user.about_me.as_deref().unwrap_or_default());
    state.templates.page("edit_profile.html", &ctx, jar, context)
}

pub async fn edit_profile_submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<EditProfileForm>,
) -> Result<Response, AppError> {
    let user = ctx.require_user()?.clone();
    let old_username = user.username.clone();
    let new_username = form.username.clone();

    match state.db(move |db| edit_profile(db, &user, &form)).await {
        Ok(()) => {
            if old_username != new_username {
                info!("User {} renamed to {}", old_username, new_username);
            }
            Ok(flash::redirect(
                jar,
                "/edit_profile",
                FlashMessage::info("Your changes have been saved."),
            ))
        }
        Err(e) if e.is_user_facing() => Ok(flash::redirect(jar, "/edit_profile", e.flash())),
        Err(e) => Err(e),
    }
}
