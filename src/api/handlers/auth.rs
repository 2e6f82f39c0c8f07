/*
 * Responsibility
 * - GET /auth: provider listing
 * - GET /auth/logout: clear token cookies and the login session
 * - GET /auth/token_info: decoded view of the caller's bearer token
 * - any other /auth path: 403
 */
use axum::{Json, extract::State};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use tracing::debug;

use crate::api::cookies::{
    self, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, session_cookie_removal, token_cookie_removal,
};
use crate::api::dto::auth::{TokenInfoBody, TokenInfoResponse};
use crate::api::extractors::{AuthContext, AuthCtxExtractor};
use crate::error::AppError;
use crate::services::sso::ProviderKind;
use crate::state::AppState;

pub async fn index() -> String {
    let names: Vec<&str> = ProviderKind::ALL.into_iter().map(ProviderKind::as_str).collect();
    format!("Please select your SSO provider: {}", names.join(", "))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    signed: SignedCookieJar,
) -> Result<(CookieJar, SignedCookieJar, &'static str), AppError> {
    if let Some(id) = cookies::session_id(&signed) {
        state.sessions.destroy(&id).await?;
    }

    let jar = jar
        .remove(token_cookie_removal(ID_TOKEN_COOKIE, &state.settings))
        .remove(token_cookie_removal(REFRESH_TOKEN_COOKIE, &state.settings));
    let signed = signed.remove(session_cookie_removal());

    debug!("logged out");
    Ok((jar, signed, "Logged out"))
}

pub async fn token_info(
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<TokenInfoResponse>, AppError> {
    let AuthContext::Authenticated(auth) = ctx else {
        return Err(AppError::forbidden("Invalid token"));
    };

    let token = &auth.token;
    Ok(Json(TokenInfoResponse {
        token: TokenInfoBody {
            id_token: token.id_token.clone(),
            header: token.header.clone(),
            payload: token.claims.clone(),
        },
        privilege_level: auth.privilege_level.as_u8(),
    }))
}

pub async fn unknown_auth_route() -> AppError {
    AppError::forbidden("Unauthorized")
}
