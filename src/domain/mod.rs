/*
 * Responsibility
 * - Storage-independent domain types (LocalUser, account status, privilege levels)
 */
pub mod privilege;
pub mod user;

pub use privilege::{PrivilegeLevel, max_privilege};
pub use user::{AccountStatus, GroupMembership, LocalUser, NewUser};
