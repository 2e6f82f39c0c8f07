use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::LocalUser;
use crate::error::AppError;
use crate::repos::UserStore;
use crate::services::auth::refresh_token::{IssuedRefreshToken, RefreshTokenService};
use crate::services::auth::token_codec::{SignedToken, TokenCodec, VerifiedToken};
use crate::services::sso::ProviderIdentity;

/// Orchestrates bearer-token issuance for the two credential-issuing paths:
/// the post-login session exchange and the refresh exchange.
///
/// - TokenCodec signs/verifies bearer tokens.
/// - RefreshTokenService owns refresh token issuance and redemption.
///
/// Account status is re-checked on both paths.
#[derive(Clone)]
pub struct TokenService {
    codec: Arc<TokenCodec>,
    refresh: RefreshTokenService,
    users: Arc<dyn UserStore>,
}

/// Service-level result of a successful exchange; handlers shape the response.
#[derive(Clone, Debug)]
pub struct IssuedTokens {
    pub bearer: SignedToken,
    pub refresh: Option<IssuedRefreshToken>,
}

#[derive(Clone, Debug)]
pub enum ExchangeOutcome {
    Issued(IssuedTokens),
    /// Authenticated by the provider, but not provisioned locally.
    Unregistered,
}

impl TokenService {
    pub fn new(codec: Arc<TokenCodec>, refresh: RefreshTokenService, users: Arc<dyn UserStore>) -> Self {
        Self {
            codec,
            refresh,
            users,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn verify(&self, token: &str) -> Option<VerifiedToken> {
        self.codec.verify(token)
    }

    /// Exchange a provider identity for a bearer token (and optionally a refresh token).
    pub async fn exchange_identity(
        &self,
        identity: &ProviderIdentity,
        with_refresh_token: bool,
    ) -> Result<ExchangeOutcome, AppError> {
        let user = self
            .users
            .find_by_linked_email(&identity.email)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to look up user by linked email");
                AppError::Internal
            })?;

        let Some(user) = user else {
            info!(email = %identity.email, "Authenticated identity is not registered");
            return Ok(ExchangeOutcome::Unregistered);
        };

        ensure_active(&user)?;

        let bearer = self.codec.sign(&user)?;
        let refresh = if with_refresh_token {
            Some(self.refresh.issue(&user.id).await?)
        } else {
            None
        };

        info!(user_id = %user.id, refresh = refresh.is_some(), "Bearer token issued");
        Ok(ExchangeOutcome::Issued(IssuedTokens { bearer, refresh }))
    }

    /// Mint a fresh bearer token from a refresh token. The refresh token is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SignedToken, AppError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, AppError> {
        let user = self.refresh.redeem(refresh_token, now).await?;
        self.codec.sign(&user)
    }
}

fn ensure_active(user: &LocalUser) -> Result<(), AppError> {
    match user.status.rejection_message() {
        None => Ok(()),
        Some(message) => {
            warn!(user_id = %user.id, status = %user.status, "Token issuance rejected for inactive account");
            Err(AppError::forbidden(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountStatus;
    use crate::test_support::{MemoryUserStore, codec, identity_for, user};
    use axum::http::StatusCode;

    fn service(store: Arc<MemoryUserStore>) -> TokenService {
        let refresh = RefreshTokenService::new(store.clone(), 12 * 60 * 60);
        TokenService::new(Arc::new(codec()), refresh, store)
    }

    #[tokio::test]
    async fn registered_active_user_gets_a_token() {
        let u = user("u1", &["admin"]);
        let store = Arc::new(MemoryUserStore::with_users([u.clone()]));
        let svc = service(store.clone());

        let ExchangeOutcome::Issued(tokens) = svc.exchange_identity(&identity_for(&u), false).await.unwrap() else {
            panic!("expected tokens");
        };
        assert!(tokens.refresh.is_none());
        assert_eq!(svc.verify(&tokens.bearer.token).unwrap().claims.id, "u1");
        assert_eq!(store.refresh_token_count("u1"), 0);
    }

    #[tokio::test]
    async fn refresh_token_is_issued_on_request() {
        let u = user("u1", &["student"]);
        let store = Arc::new(MemoryUserStore::with_users([u.clone()]));
        let svc = service(store.clone());

        let ExchangeOutcome::Issued(tokens) = svc.exchange_identity(&identity_for(&u), true).await.unwrap() else {
            panic!("expected tokens");
        };
        let refresh = tokens.refresh.unwrap();
        assert_eq!(store.refresh_token_count("u1"), 1);

        let fresh = svc.refresh(&refresh.token).await.unwrap();
        assert_eq!(svc.verify(&fresh.token).unwrap().claims.id, "u1");
    }

    #[tokio::test]
    async fn unknown_email_is_unregistered() {
        let svc = service(Arc::new(MemoryUserStore::default()));
        let u = user("ghost", &["student"]);

        let outcome = svc.exchange_identity(&identity_for(&u), true).await.unwrap();
        assert!(matches!(outcome, ExchangeOutcome::Unregistered));
    }

    #[tokio::test]
    async fn disabled_user_gets_no_token() {
        let mut u = user("u1", &["teacher"]);
        u.status = AccountStatus::Disabled;
        let store = Arc::new(MemoryUserStore::with_users([u.clone()]));
        let svc = service(store.clone());

        let err = svc.exchange_identity(&identity_for(&u), true).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "User account is disabled");
        assert_eq!(store.refresh_token_count("u1"), 0);
    }
}
