use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tera::Context;
use tracing::{info, warn};
use uuid::Uuid;

use microblog_db::models::UserRow;
use microblog_db::{Database, is_unique_violation, now_timestamp};
use microblog_types::api::{
    LoginForm, NextQuery, RegisterForm, ResetPasswordClaims, ResetPasswordForm,
    ResetPasswordRequestForm, SessionClaims, Validate,
};
use microblog_types::models::FlashMessage;

use crate::csrf::CsrfForm;
use crate::error::AppError;
use crate::flash;
use crate::mail::password_reset_email;
use crate::middleware::RequestContext;
use crate::state::{AppConfig, AppState};

pub const SESSION_COOKIE: &str = "session";

const SESSION_TTL_DAYS: i64 = 1;
const REMEMBER_ME_DAYS: i64 = 30;

// -- Passwords --

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// -- Tokens --

fn expiry(seconds: i64) -> usize {
    (chrono::Utc::now() + chrono::Duration::seconds(seconds))
        .timestamp()
        .max(0) as usize
}

/// HS256, `exp` enforced to the second (no leeway).
fn strict_validation() -> Validation {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation
}

pub fn create_session_token(secret: &str, user_id: &str, ttl_secs: i64) -> anyhow::Result<String> {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: expiry(ttl_secs),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn decode_session_token(secret: &str, token: &str) -> Option<SessionClaims> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &strict_validation(),
    )
    .map(|data| data.claims)
    .ok()
}

pub fn create_reset_token(secret: &str, user_id: &str, ttl_secs: i64) -> anyhow::Result<String> {
    let claims = ResetPasswordClaims {
        reset_password: user_id.to_string(),
        exp: expiry(ttl_secs),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// The user a reset token was issued for, if the token is authentic,
/// unexpired and the user still exists.
pub fn verify_reset_token(db: &Database, secret: &str, token: &str) -> Result<UserRow, AppError> {
    let claims = decode::<ResetPasswordClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &strict_validation(),
    )
    .map_err(|_| AppError::InvalidOrExpiredToken)?
    .claims;

    db.get_user_by_id(&claims.reset_password)?
        .ok_or(AppError::InvalidOrExpiredToken)
}

fn session_cookie(config: &AppConfig, token: String, remember: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies);
    if remember {
        cookie = cookie.max_age(time::Duration::days(REMEMBER_ME_DAYS));
    }
    cookie.build()
}

// -- Operations --

/// Check credentials. Unknown usernames and wrong passwords fail the same way.
pub fn login(db: &Database, username: &str, password: &str) -> Result<UserRow, AppError> {
    let user = db
        .get_user_by_username(username)?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&user.password_hash, password) {
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

/// Create an account. Returns the new user's id.
pub fn register(db: &Database, form: &RegisterForm) -> Result<String, AppError> {
    form.validate()?;
    let email = form.email.trim();

    if db.find_user_conflict(&form.username, email)?.is_some() {
        return Err(AppError::DuplicateUser);
    }
    if form.password != form.password2 {
        return Err(AppError::PasswordMismatch);
    }

    let password_hash = hash_password(&form.password)?;
    let user_id = Uuid::new_v4().to_string();

    db.create_user(&user_id, &form.username, email, &password_hash, &now_timestamp())
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateUser
            } else {
                AppError::Internal(e)
            }
        })?;

    Ok(user_id)
}

/// Overwrite the password of the user the token was issued for.
pub fn reset_password(
    db: &Database,
    secret: &str,
    token: &str,
    form: &ResetPasswordForm,
) -> Result<UserRow, AppError> {
    let user = verify_reset_token(db, secret, token)?;
    form.validate()?;
    if form.password != form.password2 {
        return Err(AppError::PasswordMismatch);
    }

    let password_hash = hash_password(&form.password)?;
    db.update_password(&user.id, &password_hash)?;
    Ok(user)
}

/// Email a reset link if the address belongs to a user. Callers always show
/// the same response, whether or not a message was sent.
pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = email.trim().to_string();
    let Some(user) = state.db(move |db| Ok(db.get_user_by_email(&email)?)).await? else {
        info!("Password reset requested for unknown address");
        return Ok(());
    };

    let token = create_reset_token(
        &state.config.secret_key,
        &user.id,
        state.config.reset_token_ttl_secs,
    )?;
    let message = password_reset_email(&state.config, &user, &token);

    if let Err(e) = state.mailer.send(message).await {
        warn!("Failed to send password reset email to {}: {:#}", user.email, e);
    } else {
        info!("Password reset email sent to user {}", user.username);
    }
    Ok(())
}

// -- Handlers --

fn already_logged_in(ctx: &RequestContext) -> Option<Response> {
    ctx.user
        .as_ref()
        .map(|_| Redirect::to("/index").into_response())
}

fn login_url(next: &NextQuery) -> String {
    match next.safe_target() {
        Some(target) => format!("/login?next={}", urlencoding::encode(target)),
        None => "/login".to_string(),
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(next): Query<NextQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let mut context = Context::new();
    context.insert("title", "Sign In");
    context.insert("next", &next.safe_target());
    state.templates.page("login.html", &ctx, jar, context)
}

pub async fn login_submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(next): Query<NextQuery>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<LoginForm>,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }
    if let Err(e) = form.validate() {
        return Ok(flash::redirect(jar, &login_url(&next), FlashMessage::error(e.to_string())));
    }

    let remember = form.remember();
    let username = form.username.clone();
    let result = state
        .db(move |db| login(db, &form.username, &form.password))
        .await;

    let user = match result {
        Ok(user) => user,
        Err(e) if e.is_user_facing() => {
            warn!("Failed login attempt for {}", username);
            return Ok(flash::redirect(jar, &login_url(&next), e.flash()));
        }
        Err(e) => return Err(e),
    };

    let ttl_days = if remember { REMEMBER_ME_DAYS } else { SESSION_TTL_DAYS };
    let token = create_session_token(&state.config.secret_key, &user.id, ttl_days * 86_400)?;
    info!("User {} logged in", user.username);

    let jar = jar.add(session_cookie(&state.config, token, remember));
    let target = next.safe_target().unwrap_or("/index");
    Ok((jar, Redirect::to(target)).into_response())
}

pub async fn logout(jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/index")).into_response()
}

pub async fn register_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let mut context = Context::new();
    context.insert("title", "Register");
    state.templates.page("register.html", &ctx, jar, context)
}

pub async fn register_submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<RegisterForm>,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let username = form.username.clone();
    match state.db(move |db| register(db, &form)).await {
        Ok(_) => {
            info!("Registered new user {}", username);
            Ok(flash::redirect(
                jar,
                "/login",
                FlashMessage::info("Congratulations, you are now a registered user!"),
            ))
        }
        Err(e) if e.is_user_facing() => Ok(flash::redirect(jar, "/register", e.flash())),
        Err(e) => Err(e),
    }
}

pub async fn reset_request_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let mut context = Context::new();
    context.insert("title", "Reset Password");
    state
        .templates
        .page("reset_password_request.html", &ctx, jar, context)
}

pub async fn reset_request_submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<ResetPasswordRequestForm>,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }
    if let Err(e) = form.validate() {
        return Ok(flash::redirect(
            jar,
            "/reset_password_request",
            FlashMessage::error(e.to_string()),
        ));
    }

    request_password_reset(&state, &form.email).await?;
    Ok(flash::redirect(
        jar,
        "/login",
        FlashMessage::info("Check your email for the instructions to reset your password"),
    ))
}

pub async fn reset_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(token): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let secret = state.config.secret_key.clone();
    let check = token.clone();
    match state.db(move |db| verify_reset_token(db, &secret, &check)).await {
        Ok(_) => {}
        Err(e) if e.is_user_facing() => return Ok(flash::redirect(jar, "/login", e.flash())),
        Err(e) => return Err(e),
    }

    let mut context = Context::new();
    context.insert("title", "Reset Password");
    context.insert("token", &token);
    state.templates.page("reset_password.html", &ctx, jar, context)
}

pub async fn reset_submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(token): Path<String>,
    jar: CookieJar,
    CsrfForm(form): CsrfForm<ResetPasswordForm>,
) -> Result<Response, AppError> {
    if let Some(redirect) = already_logged_in(&ctx) {
        return Ok(redirect);
    }

    let secret = state.config.secret_key.clone();
    let token_for_db = token.clone();
    let result = state
        .db(move |db| reset_password(db, &secret, &token_for_db, &form))
        .await;

    match result {
        Ok(user) => {
            info!("Password reset for user {}", user.username);
            Ok(flash::redirect(
                jar,
                "/login",
                FlashMessage::info("Your password has been reset."),
            ))
        }
        Err(AppError::InvalidOrExpiredToken) => Ok(flash::redirect(
            jar,
            "/login",
            AppError::InvalidOrExpiredToken.flash(),
        )),
        Err(e) if e.is_user_facing() => {
            let back = format!("/reset_password/{}", urlencoding::encode(&token));
            Ok(flash::redirect(jar, &back, e.flash()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn register_form(username: &str, email: &str, password: &str, password2: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            password2: password2.into(),
            csrf_token: String::new(),
        }
    }

    fn db_with_alice() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = register(
            &db,
            &register_form("alice", "alice@example.com", "hunter22", "hunter22"),
        )
        .unwrap();
        (db, id)
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "wrong horse"));
        assert!(!verify_password("not-a-hash", "correct horse"));
    }

    #[test]
    fn login_checks_credentials() {
        let (db, id) = db_with_alice();

        assert_eq!(login(&db, "alice", "hunter22").unwrap().id, id);
        assert!(matches!(
            login(&db, "alice", "wrong"),
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&db, "nobody", "hunter22"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (db, _) = db_with_alice();

        let same_name = register_form("alice", "other@example.com", "pw", "pw");
        assert!(matches!(register(&db, &same_name), Err(AppError::DuplicateUser)));

        let same_email = register_form("alice2", "alice@example.com", "pw", "pw");
        assert!(matches!(register(&db, &same_email), Err(AppError::DuplicateUser)));

        assert!(db.get_user_by_username("alice2").unwrap().is_none());
    }

    #[test]
    fn duplicate_is_reported_before_mismatch() {
        let (db, _) = db_with_alice();
        let form = register_form("alice", "alice@example.com", "a", "b");
        assert!(matches!(register(&db, &form), Err(AppError::DuplicateUser)));
    }

    #[test]
    fn mismatched_passwords_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let form = register_form("bob", "bob@example.com", "one", "two");
        assert!(matches!(register(&db, &form), Err(AppError::PasswordMismatch)));
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn session_token_roundtrip() {
        let token = create_session_token(SECRET, "user-1", 3600).unwrap();
        assert_eq!(decode_session_token(SECRET, &token).unwrap().sub, "user-1");
        assert!(decode_session_token("other-secret", &token).is_none());

        let expired = create_session_token(SECRET, "user-1", -3600).unwrap();
        assert!(decode_session_token(SECRET, &expired).is_none());

        let just_expired = create_session_token(SECRET, "user-1", -5).unwrap();
        assert!(decode_session_token(SECRET, &just_expired).is_none());
    }

    #[test]
    fn reset_token_verifies_for_its_user_only() {
        let (db, id) = db_with_alice();

        let token = create_reset_token(SECRET, &id, 600).unwrap();
        assert_eq!(verify_reset_token(&db, SECRET, &token).unwrap().id, id);

        let expired = create_reset_token(SECRET, &id, -3600).unwrap();
        assert!(matches!(
            verify_reset_token(&db, SECRET, &expired),
            Err(AppError::InvalidOrExpiredToken)
        ));

        let just_expired = create_reset_token(SECRET, &id, -5).unwrap();
        assert!(matches!(
            verify_reset_token(&db, SECRET, &just_expired),
            Err(AppError::InvalidOrExpiredToken)
        ));

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(
            verify_reset_token(&db, SECRET, &tampered),
            Err(AppError::InvalidOrExpiredToken)
        ));

        // A session token is not a reset token.
        let session = create_session_token(SECRET, &id, 600).unwrap();
        assert!(matches!(
            verify_reset_token(&db, SECRET, &session),
            Err(AppError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn reset_password_overwrites_hash() {
        let (db, id) = db_with_alice();
        let token = create_reset_token(SECRET, &id, 600).unwrap();

        let mismatch = ResetPasswordForm {
            password: "new-one".into(),
            password2: "new-two".into(),
            csrf_token: String::new(),
        };
        assert!(matches!(
            reset_password(&db, SECRET, &token, &mismatch),
            Err(AppError::PasswordMismatch)
        ));

        let form = ResetPasswordForm {
            password: "new-pass".into(),
            password2: "new-pass".into(),
            csrf_token: String::new(),
        };
        reset_password(&db, SECRET, &token, &form).unwrap();
        assert!(login(&db, "alice", "new-pass").is_ok());
        assert!(login(&db, "alice", "hunter22").is_err());
    }
}
