//! Shared fixtures for unit and router tests: key material, users, an in-memory
//! `UserStore`, and identity providers that never touch the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};

use crate::api;
use crate::domain::{AccountStatus, LocalUser, NewUser};
use crate::repos::error::{RepoError, RepoResult};
use crate::repos::UserStore;
use crate::repos::user_repo::RefreshTokenMatch;
use crate::services::auth::refresh_token::hash_refresh_token;
use crate::services::auth::{RefreshTokenService, TokenCodec, TokenService};
use crate::services::cache::MemoryCache;
use crate::services::session::{CacheSessionStore, LoginBinding};
use crate::services::sso::{
    AuthorizationRequest, IdentityProvider, ProviderError, ProviderIdentity, ProviderKind, Providers,
};
use crate::state::{AppState, AuthSettings};

pub const PRIVATE_PEM: &str = include_str!("../tests/fixtures/es256_private.pem");
pub const PUBLIC_PEM: &str = include_str!("../tests/fixtures/es256_public.pem");
pub const OTHER_PRIVATE_PEM: &str = include_str!("../tests/fixtures/es256_other_private.pem");
pub const OTHER_PUBLIC_PEM: &str = include_str!("../tests/fixtures/es256_other_public.pem");

pub const TEST_ISSUER: &str = "sso.campus.test";
pub const ACCESS_TTL_SECONDS: u64 = 4 * 60 * 60;
pub const REFRESH_TTL_SECONDS: u64 = 12 * 60 * 60;
const SESSION_SECRET: &[u8] = b"router-test-session-secret-0123456789";

pub fn codec() -> TokenCodec {
    TokenCodec::new(
        PRIVATE_PEM,
        PUBLIC_PEM,
        TEST_ISSUER.to_string(),
        ACCESS_TTL_SECONDS,
        0,
    )
    .unwrap()
}

pub fn user(id: &str, roles: &[&str]) -> LocalUser {
    LocalUser {
        id: id.to_string(),
        role: roles.iter().map(|r| r.to_string()).collect(),
        username: id.to_string(),
        linked_email: format!("{id}@example.org"),
        fullname: Some(format!("User {id}")),
        status: AccountStatus::Active,
        organization: "campus".to_string(),
        groups: Vec::new(),
    }
}

pub fn identity_for(user: &LocalUser) -> ProviderIdentity {
    ProviderIdentity {
        provider_subject: format!("subject-{}", user.id),
        email: user.linked_email.clone(),
        display_name: user.fullname.clone(),
    }
}

struct StoredToken {
    user_id: String,
    hash: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<LocalUser>>,
    tokens: Mutex<Vec<StoredToken>>,
}

impl MemoryUserStore {
    pub fn with_users(users: impl IntoIterator<Item = LocalUser>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().collect()),
            tokens: Mutex::default(),
        }
    }

    pub fn refresh_token_count(&self, user_id: &str) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    /// True if the raw token (not its hash) was ever stored.
    pub fn has_raw_token(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.hash == token.as_bytes())
    }

    /// Store `token` for `user_id` with an arbitrary expiry (e.g. one already past).
    pub fn insert_refresh_token(&self, user_id: &str, token: &str, expires_at: DateTime<Utc>) {
        self.tokens.lock().unwrap().push(StoredToken {
            user_id: user_id.to_string(),
            hash: hash_refresh_token(token),
            expires_at,
        });
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.lock().unwrap().iter().any(|u| u.id == user_id)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LocalUser>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_linked_email(&self, email: &str) -> RepoResult<Option<LocalUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.linked_email == email)
            .cloned())
    }

    async fn find_by_refresh_token(&self, token_hash: &[u8]) -> RepoResult<Option<RefreshTokenMatch>> {
        let stored = self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.hash == token_hash)
            .map(|t| (t.user_id.clone(), t.expires_at));
        let Some((user_id, expires_at)) = stored else {
            return Ok(None);
        };
        let user = self.find_by_id(&user_id).await?;
        Ok(user.map(|user| RefreshTokenMatch { user, expires_at }))
    }

    async fn push_refresh_token(
        &self,
        user_id: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.tokens.lock().unwrap().push(StoredToken {
            user_id: user_id.to_string(),
            hash: token_hash.to_vec(),
            expires_at,
        });
        Ok(())
    }

    async fn remove_refresh_token(&self, user_id: &str, token_hash: &[u8]) -> RepoResult<u64> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|t| !(t.user_id == user_id && t.hash == token_hash));
        Ok((before - tokens.len()) as u64)
    }

    async fn create(&self, new_user: &NewUser) -> RepoResult<LocalUser> {
        let mut users = self.users.lock().unwrap();
        let id = new_user.id();
        if users
            .iter()
            .any(|u| u.id == id || u.linked_email == new_user.linked_email)
        {
            return Err(RepoError::Conflict);
        }

        let created = LocalUser {
            id,
            role: new_user.role.clone(),
            username: new_user.username.clone(),
            linked_email: new_user.linked_email.clone(),
            fullname: new_user.fullname.clone(),
            status: AccountStatus::Active,
            organization: new_user.organization.clone(),
            groups: Vec::new(),
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn delete(&self, id: &str) -> RepoResult<bool> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        let deleted = users.len() != before;
        if deleted {
            self.tokens.lock().unwrap().retain(|t| t.user_id != id);
        }
        Ok(deleted)
    }
}

/// Identity provider that redirects to a fixed URL and treats the authorization
/// code as the user's email. Counts exchange attempts.
pub struct FakeProvider {
    kind: ProviderKind,
    exchanges: AtomicUsize,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn state(kind: ProviderKind) -> String {
        format!("state-{kind}")
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let csrf_state = Self::state(self.kind);
        let binding = match self.kind {
            ProviderKind::Microsoft => LoginBinding::Pkce {
                verifier: "test-verifier".to_string(),
                challenge: "test-challenge".to_string(),
                challenge_method: "S256".to_string(),
                csrf_state: csrf_state.clone(),
            },
            ProviderKind::Google => LoginBinding::State {
                csrf_state: csrf_state.clone(),
            },
        };
        AuthorizationRequest {
            url: format!("https://idp.test/{}/authorize?state={csrf_state}", self.kind),
            binding,
        }
    }

    async fn exchange(
        &self,
        code: &str,
        _binding: &LoginBinding,
    ) -> Result<ProviderIdentity, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderIdentity {
            provider_subject: format!("subject-{code}"),
            email: code.to_string(),
            display_name: None,
        })
    }
}

/// Application state over in-memory stores and fake providers.
pub struct TestHarness {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub microsoft: Arc<FakeProvider>,
    pub google: Arc<FakeProvider>,
}

impl TestHarness {
    pub fn new(users: impl IntoIterator<Item = LocalUser>) -> Self {
        let users = Arc::new(MemoryUserStore::with_users(users));
        let microsoft = Arc::new(FakeProvider::new(ProviderKind::Microsoft));
        let google = Arc::new(FakeProvider::new(ProviderKind::Google));

        let refresh = RefreshTokenService::new(users.clone(), REFRESH_TTL_SECONDS);
        let auth = Arc::new(TokenService::new(Arc::new(codec()), refresh, users.clone()));
        let sessions = Arc::new(CacheSessionStore::new(
            MemoryCache::new(),
            Duration::from_secs(600),
        ));
        let settings = AuthSettings {
            cookie_domain: None,
            secure_cookies: false,
            panel_path: "/panel".to_string(),
            token_exchange_path: "/auth/token".to_string(),
            access_token_ttl_seconds: ACCESS_TTL_SECONDS,
            refresh_token_ttl_seconds: REFRESH_TTL_SECONDS,
        };

        let state = AppState::new(
            auth,
            sessions,
            users.clone(),
            Providers::new(microsoft.clone(), google.clone()),
            settings,
            SESSION_SECRET,
        );

        Self {
            state,
            users,
            microsoft,
            google,
        }
    }

    pub fn app(&self) -> Router {
        api::routes(self.state.clone()).with_state(self.state.clone())
    }

    /// A bearer token for `user`, signed with the harness keys.
    pub fn bearer_for(&self, user: &LocalUser) -> String {
        self.state.auth.codec().sign(user).unwrap().token
    }
}
