use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::LocalUser;
use crate::error::AppError;
use crate::repos::UserStore;

const REFRESH_TOKEN_BYTES: usize = 64;

/// An opaque refresh token handed to the client exactly once.
#[derive(Clone, Debug)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and redeems refresh tokens.
///
/// Tokens are stored hashed (SHA-256), appended per user so several devices can
/// hold one each, and are not rotated on use: a token stays valid until its own
/// expiry, and is deleted when it is presented after that.
#[derive(Clone)]
pub struct RefreshTokenService {
    users: Arc<dyn UserStore>,
    ttl_seconds: u64,
}

impl std::fmt::Debug for RefreshTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenService")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl RefreshTokenService {
    pub fn new(users: Arc<dyn UserStore>, ttl_seconds: u64) -> Self {
        Self { users, ttl_seconds }
    }

    /// Issue a new refresh token for `user_id` and append it to the user's tokens.
    pub async fn issue(&self, user_id: &str) -> Result<IssuedRefreshToken, AppError> {
        let token = generate_refresh_token()?;
        let token_hash = hash_refresh_token(&token);
        let expires_at = Utc::now() + ChronoDuration::seconds(self.ttl_seconds as i64);

        debug!(
            user_id = %user_id,
            ttl_seconds = self.ttl_seconds,
            expires_at = %expires_at,
            "Issuing refresh token"
        );

        self.users
            .push_refresh_token(user_id, &token_hash, expires_at)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = ?e, "Failed to store refresh token");
                AppError::Internal
            })?;

        Ok(IssuedRefreshToken { token, expires_at })
    }

    /// Resolve a presented refresh token to the active user it belongs to.
    ///
    /// - unknown token: 403 "Invalid token"
    /// - account not active: 403 with the status message
    /// - expired: the entry is deleted, 401 "Token expired"
    pub async fn redeem(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<LocalUser, AppError> {
        let token_hash = hash_refresh_token(refresh_token);

        let found = self
            .users
            .find_by_refresh_token(&token_hash)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to look up refresh token");
                AppError::Internal
            })?;

        let Some(found) = found else {
            debug!("Refresh token not found");
            return Err(AppError::forbidden("Invalid token"));
        };

        if let Some(message) = found.user.status.rejection_message() {
            warn!(user_id = %found.user.id, status = %found.user.status, "Refresh rejected for inactive account");
            return Err(AppError::forbidden(message));
        }

        if found.expires_at < now {
            let removed = self
                .users
                .remove_refresh_token(&found.user.id, &token_hash)
                .await
                .map_err(|e| {
                    error!(user_id = %found.user.id, error = ?e, "Failed to delete expired refresh token");
                    AppError::Internal
                })?;
            info!(user_id = %found.user.id, removed, "Expired refresh token deleted");
            return Err(AppError::unauthorized("Token expired"));
        }

        Ok(found.user)
    }
}

fn generate_refresh_token() -> Result<String, AppError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| {
        error!(error = %e, "getrandom failed");
        AppError::Internal
    })?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    // sha256(token) -> raw 32 bytes (stored as BYTEA)
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
