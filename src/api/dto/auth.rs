/*
 * Responsibility
 * - Request/response DTOs of the /auth routes
 */
use serde::{Deserialize, Serialize};
use url::Url;

use crate::services::session::LoginHints;

/// Query string accepted by `GET /auth/{provider}`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub redirect_url: Option<String>,
    pub failed_redirect_url: Option<String>,
    pub refresh_token: Option<String>,
    pub panel: Option<String>,
}

impl LoginQuery {
    /// Validate and convert into session hints. Redirect targets must be absolute URLs.
    pub fn into_hints(self) -> Result<LoginHints, &'static str> {
        let redirect_url = non_empty(self.redirect_url);
        let failed_redirect_url = non_empty(self.failed_redirect_url);

        if let Some(url) = &redirect_url
            && Url::parse(url).is_err()
        {
            return Err("redirect_url must be an absolute URL");
        }
        if let Some(url) = &failed_redirect_url
            && Url::parse(url).is_err()
        {
            return Err("failed_redirect_url must be an absolute URL");
        }

        Ok(LoginHints {
            redirect_url,
            failed_redirect_url,
            need_refresh_token: self.refresh_token.as_deref() == Some("1"),
            panel: self.panel.as_deref() == Some("1"),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Body of `POST /auth/token`. Optional: the cookie may carry the token instead.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub auth_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Bearer token expiry, Unix milliseconds.
    pub expiration: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenInfoResponse {
    pub token: TokenInfoBody,
    pub privilege_level: u8,
}

#[derive(Debug, Serialize)]
pub struct TokenInfoBody {
    pub id_token: String,
    pub header: jsonwebtoken::Header,
    pub payload: crate::services::auth::AuthClaims,
}
