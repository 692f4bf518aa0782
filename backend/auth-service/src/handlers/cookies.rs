use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};

pub use crypto_core::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

/// HttpOnly, SameSite=Strict, Path=/ cookie living `max_age_secs`.
pub fn token_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::seconds(max_age_secs))
        .finish()
}

/// Same attributes as [`token_cookie`] with an empty value and max-age 0.
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    token_cookie(name, String::new(), 0)
}
