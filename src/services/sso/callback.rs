use serde::Deserialize;
use tracing::{info, warn};

use super::provider::{IdentityProvider, ProviderError, ProviderIdentity, ProviderKind};
use crate::services::session::{LoginBinding, SessionData};

/// Query string of a provider redirect back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Check a callback against the pending login in the session.
///
/// Order matters: a provider-reported error wins, then the pending attempt must
/// exist (with its PKCE verifier for PKCE providers), then `state` must match
/// byte for byte. Nothing here touches the network.
pub fn validate_callback<'a>(
    kind: ProviderKind,
    session: &'a SessionData,
    query: &CallbackQuery,
) -> Result<&'a LoginBinding, ProviderError> {
    if let Some(error) = &query.error {
        return Err(ProviderError::Denied(error.clone()));
    }

    let Some(binding) = session.pending_binding(kind) else {
        return Err(if kind.uses_pkce() {
            ProviderError::MissingVerifier
        } else {
            ProviderError::StateMismatch
        });
    };

    if kind.uses_pkce() && binding.pkce_verifier().is_none_or(str::is_empty) {
        return Err(ProviderError::MissingVerifier);
    }

    if query.state.as_deref() != Some(binding.csrf_state()) {
        return Err(ProviderError::StateMismatch);
    }

    Ok(binding)
}

/// Validate the callback, then redeem the code with the provider.
pub async fn complete_login(
    provider: &dyn IdentityProvider,
    session: &SessionData,
    query: &CallbackQuery,
) -> Result<ProviderIdentity, ProviderError> {
    let kind = provider.kind();

    let binding = validate_callback(kind, session, query).inspect_err(|e| {
        warn!(provider = %kind, error = %e, "provider callback rejected");
    })?;

    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ProviderError::MissingCode)?;

    let identity = provider.exchange(code, binding).await.inspect_err(|e| {
        warn!(provider = %kind, error = %e, "provider exchange failed");
    })?;

    info!(provider = %kind, email = %identity.email, "provider login succeeded");
    Ok(identity)
}
