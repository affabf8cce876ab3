use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use md5::{Digest, Md5};
use tera::{Context, Tera};

use crate::error::AppError;
use crate::flash;
use crate::middleware::RequestContext;

pub const AVATAR_FEED_SIZE: u32 = 70;
pub const AVATAR_PROFILE_SIZE: u32 = 128;

/// Page templates, compiled into the binary.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("_post.html", include_str!("../templates/_post.html")),
            ("_pagination.html", include_str!("../templates/_pagination.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("user.html", include_str!("../templates/user.html")),
            ("edit_profile.html", include_str!("../templates/edit_profile.html")),
            ("login.html", include_str!("../templates/login.html")),
            ("register.html", include_str!("../templates/register.html")),
            (
                "reset_password_request.html",
                include_str!("../templates/reset_password_request.html"),
            ),
            ("reset_password.html", include_str!("../templates/reset_password.html")),
        ])?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, AppError> {
        Ok(self.tera.render(name, context)?)
    }

    /// Render `name` with the values every page needs (current user, CSRF
    /// token, pending flash messages) and consume the flashes.
    pub fn page(
        &self,
        name: &str,
        ctx: &RequestContext,
        jar: CookieJar,
        mut context: Context,
    ) -> Result<Response, AppError> {
        let (jar, flashes) = flash::take(jar);
        context.insert("current_user", &ctx.current_user());
        context.insert("csrf_token", &ctx.csrf_token);
        context.insert("flashes", &flashes);

        let body = self.render(name, &context)?;
        Ok((jar, Html(body)).into_response())
    }
}

/// Gravatar identicon for an email address.
pub fn avatar_url(email: &str, size: u32) -> String {
    let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
        hex::encode(digest),
        size
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_hash_is_case_insensitive() {
        let url = avatar_url("MyEmailAddress@example.com ", 80);
        assert_eq!(
            url,
            "https://www.gravatar.com/avatar/0bc83cb571cd1c50ba6f3e8a78ef1346?d=identicon&s=80"
        );
        assert_eq!(url, avatar_url("myemailaddress@example.com", 80));
    }

    #[test]
    fn all_templates_parse() {
        assert!(Templates::new().is_ok());
    }
}
