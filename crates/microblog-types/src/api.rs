use serde::{Deserialize, Serialize};

// -- Token claims --

/// Claims carried by the `session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
}

/// Claims carried by an emailed password reset link. The field name differs
/// from `SessionClaims::sub` so one kind of token never decodes as the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordClaims {
    pub reset_password: String,
    pub exp: usize,
}

// -- Validation --

pub const USERNAME_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 120;
pub const POST_MAX_LEN: usize = 140;
pub const ABOUT_ME_MAX_LEN: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Field constraints for a submitted form.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Every state-changing form carries the double-submit CSRF token.
pub trait CsrfProtected {
    fn csrf_token(&self) -> &str;
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "This field is required."));
    }
    Ok(())
}

fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("Field cannot be longer than {max} characters."),
        ));
    }
    Ok(())
}

/// Usernames end up in `/user/{username}` paths, so only word characters
/// plus `_`, `-` and `.` are accepted.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    required("username", value)?;
    max_len("username", value, USERNAME_MAX_LEN)?;
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ValidationError::new(
            "username",
            "Usernames may only contain letters, digits, '_', '-' and '.'.",
        ));
    }
    // `.` and `..` are path segments, not names.
    if value.chars().all(|c| c == '.') {
        return Err(ValidationError::new(
            "username",
            "Usernames must contain a letter or digit.",
        ));
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    required("email", value)?;
    max_len("email", value, EMAIL_MAX_LEN)?;

    let invalid = || ValidationError::new("email", "Invalid email address.");
    if value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() && !domain.ends_with('.') => {
            Ok(())
        }
        _ => Err(invalid()),
    }
}

// -- Auth forms --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// Checkbox: present (any value) when ticked.
    pub remember_me: Option<String>,
    pub csrf_token: String,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }
}

impl Validate for LoginForm {
    fn validate(&self) -> Result<(), ValidationError> {
        required("username", &self.username)?;
        required("password", &self.password)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub csrf_token: String,
}

impl Validate for RegisterForm {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        required("password", &self.password)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequestForm {
    pub email: String,
    pub csrf_token: String,
}

impl Validate for ResetPasswordRequestForm {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_email(&self.email)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordForm {
    pub password: String,
    pub password2: String,
    pub csrf_token: String,
}

impl Validate for ResetPasswordForm {
    fn validate(&self) -> Result<(), ValidationError> {
        required("password", &self.password)
    }
}

// -- Posts --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub post: String,
    pub csrf_token: String,
}

impl Validate for PostForm {
    fn validate(&self) -> Result<(), ValidationError> {
        required("post", &self.post)?;
        max_len("post", self.post.trim(), POST_MAX_LEN)
    }
}

// -- Profile --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditProfileForm {
    pub username: String,
    pub about_me: String,
    pub csrf_token: String,
}

impl Validate for EditProfileForm {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_username(&self.username)?;
        max_len("about_me", &self.about_me, ABOUT_ME_MAX_LEN)
    }
}

/// Follow / unfollow buttons submit nothing but the CSRF token.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmptyForm {
    pub csrf_token: String,
}

impl Validate for EmptyForm {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

macro_rules! impl_csrf_protected {
    ($($form:ty),* $(,)?) => {
        $(
            impl CsrfProtected for $form {
                fn csrf_token(&self) -> &str {
                    &self.csrf_token
                }
            }
        )*
    };
}

impl_csrf_protected!(
    LoginForm,
    RegisterForm,
    ResetPasswordRequestForm,
    ResetPasswordForm,
    PostForm,
    EditProfileForm,
    EmptyForm,
);

// -- Query strings --

/// `?page=N`. Parsed leniently: anything that is not an integer means page 1.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

/// `?next=/path` on the login page.
#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl NextQuery {
    /// Only same-site relative paths are honoured as redirect targets.
    pub fn safe_target(&self) -> Option<&str> {
        self.next
            .as_deref()
            .filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
            .filter(|n| n.bytes().all(|b| (0x21..0x7f).contains(&b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob_the-builder.2").is_ok());
        assert!(validate_username("小明").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("a/b").is_err());
        assert!(validate_username(".").is_err());
        assert!(validate_username("..").is_err());
        assert!(validate_username("...").is_err());
        assert!(validate_username(".alice.").is_ok());
        assert!(validate_username(&"x".repeat(USERNAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("  alice@example.com ").is_ok());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@example").is_err());
        assert!(validate_email("alice@example.").is_err());
        assert!(validate_email("a@b@c.com").is_err());
        assert!(validate_email("al ice@example.com").is_err());
    }

    #[test]
    fn post_length_counts_characters() {
        let ok = PostForm {
            post: "字".repeat(POST_MAX_LEN),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let too_long = PostForm {
            post: "a".repeat(POST_MAX_LEN + 1),
            ..Default::default()
        };
        assert_eq!(too_long.validate().unwrap_err().field, "post");

        let blank = PostForm {
            post: "   ".into(),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn register_requires_password() {
        let form = RegisterForm {
            username: "alice".into(),
            email: "alice@example.com".into(),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err().field, "password");
    }

    #[test]
    fn page_query_is_lenient() {
        assert_eq!(PageQuery { page: None }.page(), 1);
        assert_eq!(PageQuery { page: Some("3".into()) }.page(), 3);
        assert_eq!(PageQuery { page: Some("abc".into()) }.page(), 1);
        assert_eq!(PageQuery { page: Some("-2".into()) }.page(), -2);
    }

    #[test]
    fn next_target_rejects_offsite_urls() {
        let next = |s: &str| NextQuery { next: Some(s.into()) };
        assert_eq!(next("/explore").safe_target(), Some("/explore"));
        assert_eq!(next("//evil.example").safe_target(), None);
        assert_eq!(next("https://evil.example/").safe_target(), None);
        assert_eq!(next("/user/a b").safe_target(), None);
        assert_eq!(NextQuery::default().safe_target(), None);
    }
}
