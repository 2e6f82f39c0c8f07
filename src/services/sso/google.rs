//! Google OAuth2 authorization code flow bound by a random `state` value.
use async_trait::async_trait;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::Deserialize;

use super::provider::{
    AuthorizationRequest, IdentityProvider, ProviderError, ProviderIdentity, ProviderKind,
    http_client,
};
use crate::config::GoogleConfig;
use crate::services::session::LoginBinding;

const GOOGLE_SCOPES: &[&str] = &["email", "profile", "openid"];

type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
}

pub struct GoogleProvider {
    client: GoogleClient,
    http: reqwest::Client,
    tokeninfo_url: String,
    userinfo_url: String,
}

impl GoogleProvider {
    pub fn new(config: &GoogleConfig) -> Result<Self, ProviderError> {
        let oauth = &config.oauth;

        let redirect_url = RedirectUrl::new(oauth.callback_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid redirect URL: {e}")))?;
        let auth_url = AuthUrl::new(oauth.authorize_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid auth URL: {e}")))?;
        let token_url = TokenUrl::new(oauth.token_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(oauth.client_id.clone()))
            .set_client_secret(ClientSecret::new(oauth.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            http: http_client()?,
            tokeninfo_url: config.tokeninfo_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    async fn fetch_subject(&self, access_token: &str) -> Result<String, ProviderError> {
        let info: TokenInfo = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProviderError::Exchange(format!("tokeninfo: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(format!("tokeninfo body: {e}")))?;

        info.sub.ok_or(ProviderError::IncompleteIdentity("sub"))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserInfo, ProviderError> {
        self.http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProviderError::Exchange(format!("userinfo: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(format!("userinfo body: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(GOOGLE_SCOPES.iter().map(|s| Scope::new((*s).to_string())))
            .add_extra_param("access_type", "online")
            .add_extra_param("prompt", "select_account")
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            binding: LoginBinding::State {
                csrf_state: csrf_token.secret().clone(),
            },
        }
    }

    async fn exchange(
        &self,
        code: &str,
        _binding: &LoginBinding,
    ) -> Result<ProviderIdentity, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        let access_token = token.access_token().secret();
        let provider_subject = self.fetch_subject(access_token).await?;
        let profile = self.fetch_profile(access_token).await?;

        Ok(ProviderIdentity {
            provider_subject,
            email: profile
                .email
                .ok_or(ProviderError::IncompleteIdentity("email"))?,
            display_name: profile.name,
        })
    }
}
