//! Identity provider adapters.
//!
//! Both providers implement `IdentityProvider`; the callback checks that protect
//! the login (provider error, pending attempt, state, PKCE verifier) live in
//! `callback` and are shared by both.

mod callback;
mod google;
mod microsoft;
mod provider;

pub use callback::{CallbackQuery, complete_login};
pub use google::GoogleProvider;
pub use microsoft::MicrosoftProvider;
pub use provider::{
    AuthorizationRequest, IdentityProvider, ProviderError, ProviderIdentity, ProviderKind,
    Providers,
};
