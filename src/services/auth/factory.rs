/// Factory: build the token services from application `Config`.
use std::sync::Arc;

use tracing::error;

use crate::config::Config;
use crate::error::AppError;
use crate::repos::UserStore;
use crate::services::auth::{RefreshTokenService, TokenCodec, TokenService};

pub fn build_token_service(
    config: &Config,
    users: Arc<dyn UserStore>,
) -> Result<Arc<TokenService>, AppError> {
    let codec = TokenCodec::new(
        &config.jwt_sign_key_pem,
        &config.jwt_verify_key_pem,
        config.jwt_issuer.clone(),
        config.access_token_ttl_seconds,
        config.access_token_leeway_seconds,
    )
    .map_err(|e| {
        error!(error = %e, "failed to load bearer token keys");
        AppError::Internal
    })?;

    let refresh = RefreshTokenService::new(users.clone(), config.refresh_token_ttl_seconds);

    Ok(Arc::new(TokenService::new(Arc::new(codec), refresh, users)))
}
