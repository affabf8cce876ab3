use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

use microblog_types::models::FlashMessage;

const FLASH_COOKIE_NAME: &str = "_flash";

/// Pending messages, base64(JSON) so the cookie value stays token-safe.
fn read(jar: &CookieJar) -> Vec<FlashMessage> {
    jar.get(FLASH_COOKIE_NAME)
        .and_then(|cookie| B64.decode(cookie.value()).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// Queue a message for the next rendered page.
pub fn push(jar: CookieJar, message: FlashMessage) -> CookieJar {
    let mut messages = read(&jar);
    messages.push(message);

    let value = match serde_json::to_vec(&messages) {
        Ok(json) => B64.encode(json),
        Err(_) => return jar,
    };

    jar.add(
        Cookie::build((FLASH_COOKIE_NAME, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Drain the queued messages; they are shown once.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<FlashMessage>) {
    let messages = read(&jar);
    if messages.is_empty() {
        return (jar, messages);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE_NAME).path("/")), messages)
}

/// `303 See Other` to `to`, carrying one flash message.
pub fn redirect(jar: CookieJar, to: &str, message: FlashMessage) -> Response {
    (push(jar, message), Redirect::to(to)).into_response()
}
