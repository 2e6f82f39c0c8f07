/*
 * Responsibility
 * - The request-scoped authentication context handlers see
 * - The middleware verifies the bearer token and stores this in request extensions;
 *   handlers only ever receive this type
 */
use std::sync::Arc;

use jsonwebtoken::Header;
use serde::Serialize;

use crate::domain::{PrivilegeLevel, max_privilege};
use crate::services::auth::{AuthClaims, VerifiedToken};

/// User fields carried by a verified bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Vec<String>,
    pub organization: String,
}

/// The raw token and its decoded parts, for `/auth/token_info`.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub id_token: String,
    pub header: Header,
    pub claims: AuthClaims,
}

#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: AuthUser,
    pub privilege_level: PrivilegeLevel,
    pub token: TokenInfo,
}

/// Derived fresh on every request from the bearer token alone.
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    #[default]
    Anonymous,
    Authenticated(Arc<Authenticated>),
}

impl AuthContext {
    pub fn from_verified(id_token: String, verified: VerifiedToken) -> Self {
        let claims = verified.claims;
        let user = AuthUser {
            id: claims.id.clone(),
            email: claims.email.clone(),
            username: claims.username.clone(),
            role: claims.role.clone(),
            organization: claims.organization.clone(),
        };

        Self::Authenticated(Arc::new(Authenticated {
            privilege_level: max_privilege(&user.role),
            user,
            token: TokenInfo {
                id_token,
                header: verified.header,
                claims,
            },
        }))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn authenticated(&self) -> Option<&Authenticated> {
        match self {
            Self::Authenticated(a) => Some(a),
            Self::Anonymous => None,
        }
    }

    pub fn privilege_level(&self) -> Option<PrivilegeLevel> {
        self.authenticated().map(|a| a.privilege_level)
    }

    /// Authenticated and at least `min_level`.
    pub fn satisfies(&self, min_level: PrivilegeLevel) -> bool {
        self.privilege_level().is_some_and(|level| level >= min_level)
    }
}
