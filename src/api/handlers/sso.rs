/*
 * Responsibility
 * - GET /auth/{provider}: regenerate the session, capture hints, redirect to the provider
 * - GET /auth/{provider}/callback: validate the callback, exchange the code,
 *   mark the session authenticated, redirect to the token exchange
 */
use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use axum_extra::extract::cookie::SignedCookieJar;
use tracing::{debug, warn};

use crate::api::cookies::{self, session_cookie};
use crate::api::dto::auth::LoginQuery;
use crate::api::handlers::found;
use crate::error::AppError;
use crate::services::session::SessionData;
use crate::services::sso::{CallbackQuery, ProviderKind, complete_login};
use crate::state::AppState;

fn provider_kind(name: &str) -> Result<ProviderKind, AppError> {
    name.parse::<ProviderKind>()
        .map_err(|_| AppError::forbidden("Unauthorized"))
}

pub async fn begin_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<LoginQuery>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Response), AppError> {
    let kind = provider_kind(&provider)?;
    let hints = query.into_hints().map_err(AppError::bad_request)?;

    // Session fixation: any previous session is dropped and a new id issued.
    if let Some(old) = cookies::session_id(&jar) {
        state.sessions.destroy(&old).await?;
    }

    let request = state.providers.get(kind).authorization_request();
    let session = SessionData::login_pending(kind, request.binding, hints);
    let id = state.sessions.create(&session).await?;

    debug!(provider = %kind, "redirecting to identity provider");
    let jar = jar.add(session_cookie(&id, &state.settings));
    Ok((jar, found(&request.url)))
}

pub async fn login_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: SignedCookieJar,
) -> Result<Response, AppError> {
    let kind = provider_kind(&provider)?;

    let id = cookies::session_id(&jar);
    let session = match &id {
        Some(id) => state.sessions.load(id).await?.unwrap_or_default(),
        None => SessionData::default(),
    };

    let identity = complete_login(state.providers.get(kind), &session, &query).await?;

    let Some(id) = id else {
        // A pending login always has a session; complete_login cannot succeed without one.
        warn!(provider = %kind, "callback accepted without a session cookie");
        return Err(AppError::Internal);
    };

    state
        .sessions
        .save(&id, &session.authenticate(kind, identity))
        .await?;

    Ok(found(&state.settings.token_exchange_path))
}
