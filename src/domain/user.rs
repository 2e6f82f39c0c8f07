use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::privilege::{PrivilegeLevel, max_privilege};

// Namespace for deterministic user ids (UUIDv5 over "organization::username").
const USER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4e0a_93b2_5d17_a8e4_2f60_9b3c_71d5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
    Locked,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Locked => "locked",
        }
    }

    /// Message returned to a client whose account may not obtain credentials.
    pub fn rejection_message(self) -> Option<&'static str> {
        match self {
            Self::Active => None,
            Self::Disabled => Some("User account is disabled"),
            Self::Locked => Some("User account is locked"),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            "locked" => Ok(Self::Locked),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: String,
    #[serde(default)]
    pub role: Vec<String>,
}

/// A locally provisioned user. Refresh tokens are kept by the store,
/// keyed by token hash, and are not part of this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub role: Vec<String>,
    pub username: String,
    pub linked_email: String,
    pub fullname: Option<String>,
    pub status: AccountStatus,
    pub organization: String,
    pub groups: Vec<GroupMembership>,
}

impl LocalUser {
    pub fn derive_id(organization: &str, username: &str) -> String {
        let name = format!("{organization}::{username}");
        Uuid::new_v5(&USER_ID_NAMESPACE, name.as_bytes()).to_string()
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        max_privilege(&self.role)
    }
}

/// Input for creating a LocalUser. The id is derived, never supplied.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub linked_email: String,
    pub fullname: Option<String>,
    pub role: Vec<String>,
    pub organization: String,
    pub created_by: String,
}

impl NewUser {
    pub fn id(&self) -> String {
        LocalUser::derive_id(&self.organization, &self.username)
    }
}
