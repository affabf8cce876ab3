use axum::{
    Extension,
    extract::{Query, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;
use tracing::{info, warn};
use uuid::Uuid;

use microblog_db::models::{NewPost, PostRow};
use microblog_db::{Database, Feed, now_timestamp, parse_timestamp};
use microblog_types::api::{PageQuery, PostForm, Validate};
use microblog_types::models::{Author, FlashMessage, PostView};
use microblog_types::pagination::{Page, PageRequest};

use crate::csrf::CsrfForm;
use crate::error::AppError;
use crate::flash;
use crate::language;
use crate::middleware::RequestContext;
use crate::state::AppState;
use crate::templates::{AVATAR_FEED_SIZE, avatar_url};

pub fn post_view(row: PostRow) -> PostView {
    let timestamp = parse_timestamp(&row.timestamp).unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' on post '{}': {}", row.timestamp, row.id, e);
        chrono::DateTime::default()
    });

    PostView {
        author: Author {
            avatar: avatar_url(&row.author_email, AVATAR_FEED_SIZE),
            username: row.author_username,
        },
        id: row.id,
        body: row.body,
        timestamp,
        language: row.language,
    }
}

// -- Operations --

/// Posts by the users `user_id` follows, newest first.
pub fn home_feed(db: &Database, user_id: &str, page: PageRequest) -> Result<Page<PostView>, AppError> {
    Ok(db
        .feed_page(Feed::Followed { follower_id: user_id }, page)?
        .map(post_view))
}

/// Every post, newest first.
pub fn explore_feed(db: &Database, page: PageRequest) -> Result<Page<PostView>, AppError> {
    Ok(db.feed_page(Feed::Explore, page)?.map(post_view))
}

/// Posts by one author, newest first.
pub fn user_feed(db: &Database, username: &str, page: PageRequest) -> Result<Page<PostView>, AppError> {
    let user = db
        .get_user_by_username(username)?
        .ok_or_else(|| AppError::not_found(format!("User {username}")))?;
    Ok(db
        .feed_page(Feed::Author { user_id: &user.id }, page)?
        .map(post_view))
}

/// Store a new post by `user_id`. Returns the post id.
pub fn submit_post(db: &Database, user_id: &str, form: &PostForm) -> Result<String, AppError> {
    form.validate()?;
    let body = form.post.trim();

    let id = Uuid::new_v4().to_string();
    let timestamp = now_timestamp();
    db.insert_post(&NewPost {
        id: &id,
        user_id,
        body,
        timestamp: &timestamp,
        language: language::detect(body),
    })?;
    Ok(id)
}

// -- Handlers --

pub async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let user_id = ctx.require_user()?.id.clone();
    let request = PageRequest::new(query.page(), state.config.posts_per_page);
    let page = state
        .db(move |db| home_feed(db, &user_id, request))
        .await?;

    let mut context = Context::new();
    context.insert("title", "Home");
    context.insert("show_post_form", &true);
    context.insert("page", &page);
    context.insert("page_url", "/index");
    state.templates.page("index.html", &ctx, jar, context)
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<PostForm>,
) -> Result<Response, AppError> {
    let user = ctx.require_user()?;
    let user_id = user.id.clone();

    match state.db(move |db| submit_post(db, &user_id, &form)).await {
        Ok(post_id) => {
            info!("User {} published post {}", user.username, post_id);
            Ok(flash::redirect(
                jar,
                "/index",
                FlashMessage::info("Your post is now live!"),
            ))
        }
        Err(e) if e.is_user_facing() => Ok(flash::redirect(jar, "/index", e.flash())),
        Err(e) => Err(e),
    }
}

pub async fn explore(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let request = PageRequest::new(query.page(), state.config.posts_per_page);
    let page = state.db(move |db| explore_feed(db, request)).await?;

    let mut context = Context::new();
    context.insert("title", "Explore");
    context.insert("show_post_form", &false);
    context.insert("page", &page);
    context.insert("page_url", "/explore");
    state.templates.page("index.html", &ctx, jar, context)
}
