use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;
use tracing::error;

use super::{AuthContext, Authenticated};
use crate::error::AppError;

/// Extractor handing the AuthContext to a handler.
/// The auth-context middleware must have inserted it into request extensions;
/// if it is missing the router is miswired, so this returns 500.
pub struct AuthCtxExtractor(pub AuthContext);

impl<S> FromRequestParts<S> for AuthCtxExtractor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthCtxExtractor)
            .ok_or_else(|| {
                error!("AuthContext missing from request extensions");
                AppError::Internal
            })
    }
}

/// Extractor for handlers that need an authenticated caller (403 otherwise).
pub struct CurrentUser(pub Arc<Authenticated>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthCtxExtractor(ctx) = AuthCtxExtractor::from_request_parts(parts, state).await?;
        match ctx {
            AuthContext::Authenticated(auth) => Ok(CurrentUser(auth)),
            AuthContext::Anonymous => Err(AppError::forbidden("Unauthorized")),
        }
    }
}
