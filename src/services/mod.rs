/*
 * Responsibility
 * - Business logic behind the handlers (token codec, refresh policy, sessions, identity providers)
 * - Infrastructure clients those services need (cache)
 */
pub mod auth;
pub mod cache;
pub mod session;
pub mod sso;
