use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error, warn};

use microblog_db::models::UserRow;
use microblog_types::models::{CurrentUser, FlashMessage};

use crate::auth::{SESSION_COOKIE, decode_session_token};
use crate::csrf::{CSRF_COOKIE, csrf_cookie, generate_token};
use crate::error::AppError;
use crate::flash;
use crate::state::AppState;

/// Per-request context: who is logged in (if anyone) and the CSRF token
/// forms on this page must echo back.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<UserRow>,
    pub csrf_token: String,
}

impl RequestContext {
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.user.as_ref().map(|u| CurrentUser {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            about_me: u.about_me.clone(),
        })
    }

    /// The logged-in user. Only call behind `require_auth`.
    pub fn require_user(&self) -> Result<&UserRow, AppError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no user in context")))
    }
}

/// Decode the session cookie, load the user and record their activity,
/// then hand a `RequestContext` to everything downstream. Issues the CSRF
/// cookie on first visit.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let (csrf_token, fresh_csrf) = match jar.get(CSRF_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => (cookie.value().to_string(), false),
        _ => (generate_token(), true),
    };

    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => authenticate(&state, cookie.value()).await,
        None => None,
    };

    req.extensions_mut().insert(RequestContext {
        user,
        csrf_token: csrf_token.clone(),
    });

    let response = next.run(req).await;

    if fresh_csrf {
        let jar = CookieJar::new().add(csrf_cookie(&state.config, csrf_token));
        (jar, response).into_response()
    } else {
        response
    }
}

async fn authenticate(state: &AppState, token: &str) -> Option<UserRow> {
    let claims = decode_session_token(&state.config.secret_key, token)?;

    let result = state
        .db(move |db| {
            let Some(user) = db.get_user_by_id(&claims.sub)? else {
                return Ok(None);
            };
            if let Err(e) = db.update_last_seen(&user.id, &microblog_db::now_timestamp()) {
                warn!("Failed to record activity for {}: {:#}", user.username, e);
            }
            Ok(Some(user))
        })
        .await;

    match result {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            debug!("Session refers to a user that no longer exists");
            None
        }
        Err(e) => {
            error!("Failed to load session user: {}", e);
            None
        }
    }
}

/// Redirect anonymous visitors to the login page, remembering where they
/// were going.
pub async fn require_auth(
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    if ctx.user.is_some() {
        return next.run(req).await;
    }

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("/login?next={}", urlencoding::encode(target));
    flash::redirect(
        jar,
        &location,
        FlashMessage::info("Please log in to access this page."),
    )
}
