//! Bearer token -> AuthContext in request extensions.
//!
//! Runs on every request and never rejects: a missing or invalid token yields
//! `AuthContext::Anonymous`, and routes decide whether anonymous access is allowed
//! (see `required_auth`). Verification failure reasons are logged, never returned.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::api::extractors::AuthContext;
use crate::state::AppState;

/// Cookie carrying the bearer token for browser clients (panel flow).
pub const ID_TOKEN_COOKIE: &str = "id_token";

/// Install the auth-context middleware on `router`.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = match bearer_token(req.headers()) {
        Some(token) => match state.auth.verify(&token) {
            Some(verified) => AuthContext::from_verified(token, verified),
            None => {
                tracing::debug!(path = %req.uri().path(), "invalid bearer token, continuing anonymous");
                AuthContext::Anonymous
            }
        },
        None => AuthContext::Anonymous,
    };

    tracing::trace!(authenticated = ctx.is_auth(), "auth context attached");

    // middleware -> extractor hand-off
    req.extensions_mut().insert(ctx);

    next.run(req).await
}

/// Token from `Authorization: Bearer <token>`, else from the `id_token` cookie.
///
/// A present Authorization header wins even when it is malformed; the cookie is
/// only consulted when the header is absent.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
    }

    CookieJar::from_headers(headers)
        .get(ID_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn header_takes_precedence_over_cookie() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "id_token=from-cookie"),
        ]);
        assert_eq!(bearer_token(&h).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let h = headers(&[(header::COOKIE, "sid=x; id_token=from-cookie")]);
        assert_eq!(bearer_token(&h).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn malformed_header_yields_no_token() {
        let h = headers(&[
            (header::AUTHORIZATION, "Basic dXNlcjpwYXNz"),
            (header::COOKIE, "id_token=from-cookie"),
        ]);
        assert_eq!(bearer_token(&h), None);
        assert_eq!(bearer_token(&headers(&[(header::AUTHORIZATION, "Bearer ")])), None);
    }

    #[test]
    fn no_credentials_yields_no_token() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
