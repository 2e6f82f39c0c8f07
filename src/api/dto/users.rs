/*
 * Responsibility
 * - Users request/response DTOs
 * - validate() for shape checks
 */
use serde::{Deserialize, Serialize};

use crate::domain::{AccountStatus, GroupMembership, LocalUser};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub linked_email: String,
    pub username: Option<String>,
    pub fullname: Option<String>,
    #[serde(default)]
    pub role: Vec<String>,
    pub organization: Option<String>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        let mut parts = self.linked_email.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err("Invalid email address");
        };
        if local.trim().is_empty() || domain.trim().is_empty() {
            return Err("Invalid email address");
        }
        if let Some(name) = &self.username
            && name.trim().is_empty()
        {
            return Err("username cannot be empty");
        }
        Ok(())
    }

    /// Username, defaulting to the local part of the email.
    pub fn username_or_default(&self) -> String {
        match &self.username {
            Some(name) => name.trim().to_string(),
            None => self
                .linked_email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Public view of a LocalUser (no groups, no refresh tokens).
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub role: Vec<String>,
    pub username: String,
    pub linked_email: String,
    pub fullname: Option<String>,
    pub status: AccountStatus,
    pub organization: String,
}

impl From<LocalUser> for UserResponse {
    fn from(u: LocalUser) -> Self {
        Self {
            id: u.id,
            role: u.role,
            username: u.username,
            linked_email: u.linked_email,
            fullname: u.fullname,
            status: u.status,
            organization: u.organization,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<GroupMembership>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub id: String,
}
