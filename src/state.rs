/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 *   - token service, session store, user store, identity providers, cookie settings
 * - Cheap to clone (everything behind Arc)
 */
use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::config::Config;
use crate::repos::UserStore;
use crate::services::auth::TokenService;
use crate::services::session::SessionStore;
use crate::services::sso::Providers;

/// Cookie and redirect settings used by the auth handlers.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Domain attribute for the bearer-token cookies (host of APP_DOMAIN).
    pub cookie_domain: Option<String>,
    pub secure_cookies: bool,
    /// Where the panel flow lands after a successful exchange.
    pub panel_path: String,
    /// Path of the session-to-token exchange, including APP_PATH_PREFIX.
    pub token_exchange_path: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cookie_domain: config.cookie_domain(),
            secure_cookies: config.app_env.is_production(),
            panel_path: config.panel_path.clone(),
            token_exchange_path: format!("{}/auth/token", config.path_prefix),
            access_token_ttl_seconds: config.access_token_ttl_seconds,
            refresh_token_ttl_seconds: config.refresh_token_ttl_seconds,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<TokenService>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub providers: Providers,
    pub settings: Arc<AuthSettings>,
    cookie_key: Key,
}

impl AppState {
    pub fn new(
        auth: Arc<TokenService>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        providers: Providers,
        settings: AuthSettings,
        session_secret: &[u8],
    ) -> Self {
        Self {
            auth,
            sessions,
            users,
            providers,
            settings: Arc::new(settings),
            cookie_key: derive_cookie_key(session_secret),
        }
    }
}

// Key::from needs 64 bytes of key material.
fn derive_cookie_key(secret: &[u8]) -> Key {
    Key::from(Sha512::digest(secret).as_slice())
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
