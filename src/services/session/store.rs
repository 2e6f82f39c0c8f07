use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::model::SessionData;
use crate::services::cache::{CacheClient, CacheError};

const SESSION_ID_BYTES: usize = 32;
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend: {0}")]
    Backend(#[from] CacheError),
    #[error("session encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session id generation failed")]
    IdGeneration,
}

/// Opaque session id delivered to the browser in the signed `sid` cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        getrandom::fill(&mut bytes).map_err(|_| SessionError::IdGeneration)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Accept an id read back from a (signature-checked) cookie.
    pub fn from_cookie(value: &str) -> Option<Self> {
        let decoded = URL_SAFE_NO_PAD.decode(value).ok()?;
        (decoded.len() == SESSION_ID_BYTES).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Session ids are bearer secrets: keep them out of logs.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(..)")
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `data` under a freshly generated id and return it.
    async fn create(&self, data: &SessionData) -> Result<SessionId, SessionError>;

    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError>;

    /// Read and delete in one step. Of two concurrent callers, at most one gets the data.
    async fn take(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Delete the session. Deleting a missing session is not an error.
    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError>;
}

/// `SessionStore` over any string cache (Valkey in production, memory in development/tests).
#[derive(Clone, Debug)]
pub struct CacheSessionStore<C: CacheClient> {
    cache: C,
    ttl: Duration,
}

impl<C: CacheClient> CacheSessionStore<C> {
    pub fn new(cache: C, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(id: &SessionId) -> String {
        format!("sso:session:{}", id.as_str())
    }

    // An undecodable session is treated as absent: the user restarts the login.
    fn decode(raw: Option<String>) -> Option<SessionData> {
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, "discarding undecodable session");
                None
            }
        }
    }
}

#[async_trait]
impl<C: CacheClient> SessionStore for CacheSessionStore<C> {
    async fn create(&self, data: &SessionData) -> Result<SessionId, SessionError> {
        let value = serde_json::to_string(data)?;

        for _ in 0..CREATE_ATTEMPTS {
            let id = SessionId::generate()?;
            if self
                .cache
                .set_if_absent_with_ttl(&Self::key(&id), &value, self.ttl)
                .await?
            {
                debug!(backend = self.cache.backend_name(), "session created");
                return Ok(id);
            }
        }

        Err(SessionError::IdGeneration)
    }

    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let raw = self.cache.get_string(&Self::key(id)).await?;
        Ok(Self::decode(raw))
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        let value = serde_json::to_string(data)?;
        self.cache
            .set_with_ttl(&Self::key(id), &value, self.ttl)
            .await?;
        Ok(())
    }

    async fn take(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let raw = self.cache.take_string(&Self::key(id)).await?;
        Ok(Self::decode(raw))
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        self.cache.del(&Self::key(id)).await?;
        Ok(())
    }
}
