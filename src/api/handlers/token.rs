/*
 * Responsibility
 * - GET /auth/token: single-use exchange of an authenticated session for a bearer token
 * - POST /auth/token: refresh exchange (refresh token in body or `id_refresh_token` cookie)
 */
use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use tracing::{debug, error};
use url::Url;

use crate::api::cookies::{
    self, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, session_cookie_removal, token_cookie,
};
use crate::api::dto::auth::{RefreshRequest, TokenResponse};
use crate::api::handlers::found;
use crate::error::AppError;
use crate::services::auth::{ExchangeOutcome, IssuedTokens};
use crate::services::session::{LoginHints, SessionData};
use crate::services::sso::ProviderIdentity;
use crate::state::AppState;

const NOT_LOGGED_IN: &str = "Unauthorized (not logged in)";
const NOT_REGISTERED: &str = "Logged user is not registered to the system";

pub async fn exchange_token(
    State(state): State<AppState>,
    signed: SignedCookieJar,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(id) = cookies::session_id(&signed) else {
        return Err(AppError::forbidden(NOT_LOGGED_IN));
    };

    // Claim the session: whoever takes it is the only one who can mint from it.
    let claimed = match state.sessions.load(&id).await? {
        Some(session) if session.is_authenticated() => state.sessions.take(&id).await?,
        _ => None,
    };
    let Some(session) = claimed.filter(SessionData::is_authenticated) else {
        debug!("token exchange without an authenticated session");
        return Err(AppError::forbidden(NOT_LOGGED_IN));
    };
    let Some(identity) = session.identity().cloned() else {
        return Err(AppError::forbidden(NOT_LOGGED_IN));
    };
    let hints = session.hints;

    // The session is consumed whatever the outcome, so the cookie goes too.
    let signed = signed.remove(session_cookie_removal());
    let response = issue_for_session(&state, jar, &identity, &hints).await;

    Ok((signed, response).into_response())
}

async fn issue_for_session(
    state: &AppState,
    jar: CookieJar,
    identity: &ProviderIdentity,
    hints: &LoginHints,
) -> Result<Response, AppError> {
    let tokens = match state
        .auth
        .exchange_identity(identity, hints.need_refresh_token)
        .await?
    {
        ExchangeOutcome::Issued(tokens) => tokens,
        ExchangeOutcome::Unregistered => {
            return match hints.failed_redirect_url.as_deref() {
                Some(url) => Ok(found(url)),
                None => Err(AppError::forbidden(NOT_REGISTERED)),
            };
        }
    };

    if let Some(target) = hints.redirect_url.as_deref() {
        let location = redirect_with_tokens(target, &tokens)?;
        return Ok(found(location.as_str()));
    }

    if hints.panel {
        let settings = &state.settings;
        let mut jar = jar.add(token_cookie(
            ID_TOKEN_COOKIE,
            tokens.bearer.token,
            settings.access_token_ttl_seconds,
            settings,
        ));
        if let Some(refresh) = tokens.refresh {
            jar = jar.add(token_cookie(
                REFRESH_TOKEN_COOKIE,
                refresh.token,
                settings.refresh_token_ttl_seconds,
                settings,
            ));
        }
        return Ok((jar, found(&settings.panel_path)).into_response());
    }

    Ok(Json(token_response(tokens)).into_response())
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, AppError> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|_| AppError::bad_request("Invalid request body"))?
            .refresh_token
            .filter(|t| !t.is_empty())
    };

    let (refresh_token, via_cookie) = match from_body {
        Some(token) => (token, false),
        None => match jar.get(REFRESH_TOKEN_COOKIE) {
            Some(cookie) => (cookie.value().to_string(), true),
            None => return Err(AppError::forbidden("Invalid token")),
        },
    };

    let bearer = state.auth.refresh(&refresh_token).await?;
    let body = Json(TokenResponse {
        auth_token: bearer.token.clone(),
        refresh_token: None,
        expiration: bearer.expires_at.timestamp_millis(),
    });

    if via_cookie {
        let jar = jar.add(token_cookie(
            ID_TOKEN_COOKIE,
            bearer.token,
            state.settings.access_token_ttl_seconds,
            &state.settings,
        ));
        return Ok((jar, body).into_response());
    }

    Ok(body.into_response())
}

fn token_response(tokens: IssuedTokens) -> TokenResponse {
    TokenResponse {
        expiration: tokens.bearer.expires_at.timestamp_millis(),
        auth_token: tokens.bearer.token,
        refresh_token: tokens.refresh.map(|r| r.token),
    }
}

/// Append the issued tokens to the caller's redirect target as query parameters.
fn redirect_with_tokens(target: &str, tokens: &IssuedTokens) -> Result<Url, AppError> {
    // Targets are validated when the login starts.
    let mut url = Url::parse(target).map_err(|e| {
        error!(error = %e, "stored redirect_url is not a valid URL");
        AppError::Internal
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("auth_token", &tokens.bearer.token);
        if let Some(refresh) = &tokens.refresh {
            query.append_pair("refresh_token", &refresh.token);
        }
    }

    Ok(url)
}
