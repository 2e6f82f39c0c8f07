use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::domain::LocalUser;
use crate::error::AppError;

/// Fixed `sub` of every bearer token this service issues.
pub const TOKEN_SUBJECT: &str = "login-auth-token";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid signing key: {0}")]
    SigningKey(String),
    #[error("invalid verification key: {0}")]
    VerificationKey(String),
}

/// Bearer token claims: the user snapshot plus the pinned standard claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub id: String,
    pub role: Vec<String>,
    pub username: String,
    pub email: String,
    pub organization: String,

    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A token that passed signature, algorithm, issuer, subject and expiry checks.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: AuthClaims,
}

/// ES256 (P-256 / SHA-256) signer and verifier for the self-issued bearer token.
///
/// Keys are loaded once at startup and never regenerated.
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    ttl_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenCodec {
    /// `private_key_pem` is a PKCS#8 P-256 key, `public_key_pem` its SPKI public key.
    pub fn new(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: String,
        ttl_seconds: u64,
        leeway_seconds: u64,
    ) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_ec_pem(private_key_pem.as_bytes())
            .map_err(|e| TokenError::SigningKey(e.to_string()))?;
        let decoding_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
            .map_err(|e| TokenError::VerificationKey(e.to_string()))?;

        // Only ES256 is accepted: no algorithm substitution, no "none".
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.sub = Some(TOKEN_SUBJECT.to_string());
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        validation.leeway = leeway_seconds;

        Ok(Self {
            issuer,
            ttl_seconds,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn sign(&self, user: &LocalUser) -> Result<SignedToken, AppError> {
        self.sign_at(user, Utc::now())
    }

    pub fn sign_at(&self, user: &LocalUser, now: DateTime<Utc>) -> Result<SignedToken, AppError> {
        let expires_at = now + ChronoDuration::seconds(self.ttl_seconds as i64);
        let claims = AuthClaims {
            id: user.id.clone(),
            role: user.role.clone(),
            username: user.username.clone(),
            email: user.linked_email.clone(),
            organization: user.organization.clone(),
            iss: self.issuer.clone(),
            sub: TOKEN_SUBJECT.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("JWT".to_string());
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, user_id = %user.id, "failed to sign bearer token");
            AppError::Internal
        })?;

        Ok(SignedToken { token, expires_at })
    }

    /// Returns `None` on any failure. The reason is logged, never returned.
    pub fn verify(&self, token: &str) -> Option<VerifiedToken> {
        match jsonwebtoken::decode::<AuthClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(VerifiedToken {
                header: data.header,
                claims: data.claims,
            }),
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }
}
