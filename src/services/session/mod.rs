//! Server-side login sessions bridging a provider round trip to local token issuance.
//!
//! A session is an explicit state machine (`SessionStage`): it is created anonymous,
//! moves to `LoginPending` when a provider redirect is issued, and to `Authenticated`
//! once the provider callback has produced an identity. The token exchange claims an
//! authenticated session with `SessionStore::take`, so it can be redeemed once.

mod model;
mod store;

pub use model::{LoginBinding, LoginHints, SessionData};
pub use store::{CacheSessionStore, SessionError, SessionId, SessionStore};
