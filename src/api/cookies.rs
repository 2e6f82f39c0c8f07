/*
 * Responsibility
 * - Names and attributes of the cookies this service sets
 *   - `sid`: signed session id (login round trip only)
 *   - `id_token` / `id_refresh_token`: bearer and refresh token for the panel flow
 */
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use time::Duration as TimeDuration;

use crate::services::session::SessionId;
use crate::state::AuthSettings;

pub use crate::middleware::auth::ID_TOKEN_COOKIE;

pub const SESSION_COOKIE: &str = "sid";
pub const REFRESH_TOKEN_COOKIE: &str = "id_refresh_token";

/// Session id from the signed `sid` cookie. Tampered or malformed values read as none.
pub fn session_id(jar: &SignedCookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| SessionId::from_cookie(c.value()))
}

pub fn session_cookie(id: &SessionId, settings: &AuthSettings) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .path("/")
        .build()
}

/// httpOnly cookie holding a token, scoped to the configured domain.
pub fn token_cookie(
    name: &'static str,
    value: String,
    max_age_seconds: u64,
    settings: &AuthSettings,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .path("/")
        .max_age(TimeDuration::seconds(max_age_seconds as i64))
        .build();
    if let Some(domain) = &settings.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

/// A cookie matching `token_cookie`'s path and domain, for removal.
pub fn token_cookie_removal(name: &'static str, settings: &AuthSettings) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    if let Some(domain) = &settings.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

pub fn session_cookie_removal() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
