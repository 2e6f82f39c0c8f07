/*
 * Responsibility
 * - Persistence layer (LocalUser registry and its refresh tokens)
 */
pub mod error;
pub mod user_repo;

pub use user_repo::{PgUserRepo, UserStore};
