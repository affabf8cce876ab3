pub mod auth;
pub mod csrf;
pub mod error;
pub mod feed;
pub mod flash;
pub mod language;
pub mod mail;
pub mod middleware;
pub mod profile;
pub mod social;
pub mod state;
pub mod templates;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::error::AppError;
use crate::middleware::{load_session, require_auth};
use crate::state::AppState;

/// All routes of the site. Pages behind `require_auth` bounce anonymous
/// visitors to `/login?next=...`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/logout", get(auth::logout))
        .route("/register", get(auth::register_page).post(auth::register_submit))
        .route(
            "/reset_password_request",
            get(auth::reset_request_page).post(auth::reset_request_submit),
        )
        .route(
            "/reset_password/{token}",
            get(auth::reset_page).post(auth::reset_submit),
        );

    let protected_routes = Router::new()
        .route("/", get(feed::index).post(feed::create_post))
        .route("/index", get(feed::index).post(feed::create_post))
        .route("/explore", get(feed::explore))
        .route("/user/{username}", get(profile::user_page))
        .route(
            "/edit_profile",
            get(profile::edit_profile_page).post(profile::edit_profile_submit),
        )
        .route("/follow/{username}", post(social::follow_user))
        .route("/unfollow/{username}", post(social::unfollow_user))
        .route_layer(from_fn(require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), load_session))
        .with_state(state)
}

async fn not_found() -> Response {
    AppError::not_found("Page").into_response()
}
