use serde::{Deserialize, Serialize};

use crate::services::sso::{ProviderIdentity, ProviderKind};

/// Post-login hints captured from the login query string before the provider redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginHints {
    pub redirect_url: Option<String>,
    pub failed_redirect_url: Option<String>,
    pub need_refresh_token: bool,
    pub panel: bool,
}

/// What binds a provider callback to the login attempt that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoginBinding {
    Pkce {
        verifier: String,
        challenge: String,
        challenge_method: String,
        csrf_state: String,
    },
    State {
        csrf_state: String,
    },
}

impl LoginBinding {
    pub fn csrf_state(&self) -> &str {
        match self {
            Self::Pkce { csrf_state, .. } | Self::State { csrf_state } => csrf_state,
        }
    }

    pub fn pkce_verifier(&self) -> Option<&str> {
        match self {
            Self::Pkce { verifier, .. } => Some(verifier),
            Self::State { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SessionStage {
    #[default]
    Anonymous,
    LoginPending {
        provider: ProviderKind,
        binding: LoginBinding,
    },
    Authenticated {
        provider: ProviderKind,
        identity: ProviderIdentity,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub stage: SessionStage,
    #[serde(default)]
    pub hints: LoginHints,
}

impl SessionData {
    /// A fresh login attempt. Nothing from a previous attempt survives.
    pub fn login_pending(provider: ProviderKind, binding: LoginBinding, hints: LoginHints) -> Self {
        Self {
            stage: SessionStage::LoginPending { provider, binding },
            hints,
        }
    }

    /// The pending binding, if this session is waiting on a callback from `provider`.
    pub fn pending_binding(&self, provider: ProviderKind) -> Option<&LoginBinding> {
        match &self.stage {
            SessionStage::LoginPending {
                provider: pending,
                binding,
            } if *pending == provider => Some(binding),
            _ => None,
        }
    }

    /// Transition to `Authenticated`, dropping the login binding.
    pub fn authenticate(self, provider: ProviderKind, identity: ProviderIdentity) -> Self {
        Self {
            stage: SessionStage::Authenticated { provider, identity },
            hints: self.hints,
        }
    }

    pub fn identity(&self) -> Option<&ProviderIdentity> {
        match &self.stage {
            SessionStage::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }
}
