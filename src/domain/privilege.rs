//! Role tokens and the ordered privilege table derived from them.
use serde::Serialize;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_STUDENT: &str = "student";

/// Integer rank gating administrative operations.
///
/// The ordering of the variants is the privilege ordering, so comparisons
/// (`>=`) and `max` work directly on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum PrivilegeLevel {
    /// Authenticated, but no recognized role.
    #[default]
    Unprivileged = 0,
    Student = 1,
    Teacher = 2,
    Admin = 3,
}

impl PrivilegeLevel {
    pub fn from_role(role: &str) -> Self {
        match role {
            ROLE_ADMIN => Self::Admin,
            ROLE_TEACHER => Self::Teacher,
            ROLE_STUDENT => Self::Student,
            _ => Self::Unprivileged,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<PrivilegeLevel> for u8 {
    fn from(level: PrivilegeLevel) -> Self {
        level.as_u8()
    }
}

/// Highest level granted by any role in the set. Roles never stack.
pub fn max_privilege<I, S>(roles: I) -> PrivilegeLevel
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    roles
        .into_iter()
        .map(|r| PrivilegeLevel::from_role(r.as_ref()))
        .max()
        .unwrap_or_default()
}
