//! `required_auth(min_level)`: route-level privilege gate.
//!
//! Use with `route_layer(middleware::from_fn_with_state(level, required_auth))` on a
//! router that already sits behind the auth-context middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::api::extractors::AuthContext;
use crate::domain::PrivilegeLevel;
use crate::error::AppError;

/// Reject with 403 unless the caller is authenticated with at least `min_level`.
pub async fn required_auth(
    State(min_level): State<PrivilegeLevel>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ctx) = req.extensions().get::<AuthContext>() else {
        error!("required_auth used without the auth-context middleware");
        return Err(AppError::Internal);
    };

    if !ctx.satisfies(min_level) {
        debug!(
            required = min_level.as_u8(),
            actual = ?ctx.privilege_level().map(PrivilegeLevel::as_u8),
            "privilege check failed"
        );
        return Err(AppError::forbidden("Unauthorized"));
    }

    Ok(next.run(req).await)
}
