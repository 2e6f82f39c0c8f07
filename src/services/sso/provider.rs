use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;
use crate::services::session::LoginBinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Microsoft,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Microsoft, ProviderKind::Google];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Microsoft => "microsoft",
            Self::Google => "google",
        }
    }

    pub fn uses_pkce(self) -> bool {
        matches!(self, Self::Microsoft)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.as_str() == s).ok_or(())
    }
}

/// Normalized result of a successful provider login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider_subject: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Where to send the browser, and what the callback must present to match it.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub binding: LoginBinding,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned error: {0}")]
    Denied(String),
    #[error("missing PKCE verifier")]
    MissingVerifier,
    #[error("CSRF state mismatch")]
    StateMismatch,
    #[error("missing authorization code")]
    MissingCode,
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("id_token rejected: {0}")]
    IdToken(String),
    #[error("identity incomplete: missing {0}")]
    IncompleteIdentity(&'static str),
    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Denied(code) => {
                AppError::bad_request(format!("Unable to obtain user identity ({code})"))
            }
            ProviderError::MissingVerifier | ProviderError::MissingCode => {
                AppError::bad_request("Bad Request")
            }
            ProviderError::StateMismatch => AppError::forbidden("CSRF state mismatch"),
            ProviderError::Exchange(_)
            | ProviderError::IdToken(_)
            | ProviderError::IncompleteIdentity(_) => AppError::AccessNotGranted,
            ProviderError::Configuration(_) => AppError::Internal,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Build the provider redirect for a new login attempt.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Redeem an authorization code. Only called after the callback was validated.
    async fn exchange(
        &self,
        code: &str,
        binding: &LoginBinding,
    ) -> Result<ProviderIdentity, ProviderError>;
}

/// The configured providers, injected through application state.
#[derive(Clone)]
pub struct Providers {
    microsoft: Arc<dyn IdentityProvider>,
    google: Arc<dyn IdentityProvider>,
}

impl Providers {
    pub fn new(microsoft: Arc<dyn IdentityProvider>, google: Arc<dyn IdentityProvider>) -> Self {
        Self { microsoft, google }
    }

    pub fn get(&self, kind: ProviderKind) -> &dyn IdentityProvider {
        match kind {
            ProviderKind::Microsoft => self.microsoft.as_ref(),
            ProviderKind::Google => self.google.as_ref(),
        }
    }
}

/// HTTP client for provider calls. Redirects are not followed.
pub fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ProviderError::Configuration(e.to_string()))
}
