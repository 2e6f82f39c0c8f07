//! Microsoft identity platform (v2 endpoints), authorization code flow with PKCE.
//!
//! The `id_token` returned by the token endpoint is checked against the
//! authority's published signing keys before any of its claims are used.
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::provider::{
    AuthorizationRequest, IdentityProvider, ProviderError, ProviderIdentity, ProviderKind,
    http_client,
};
use crate::config::MicrosoftConfig;
use crate::services::session::LoginBinding;

const MICROSOFT_SCOPES: &[&str] = &["User.Read", "email", "profile", "openid"];
const PKCE_METHOD: &str = "S256";

/// The token endpoint also returns an OpenID `id_token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type MicrosoftTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type UnconfiguredClient = Client<
    BasicErrorResponse,
    MicrosoftTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
>;

type MicrosoftClient = Client<
    BasicErrorResponse,
    MicrosoftTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    tid: Option<String>,
    preferred_username: Option<String>,
    name: Option<String>,
    oid: Option<String>,
}

pub struct MicrosoftProvider {
    client: MicrosoftClient,
    http: reqwest::Client,
    client_id: String,
    jwks_url: String,
    issuer: String,
    keys: RwLock<Option<JwkSet>>,
}

impl MicrosoftProvider {
    pub fn new(config: &MicrosoftConfig) -> Result<Self, ProviderError> {
        let oauth = &config.oauth;

        let auth_url = AuthUrl::new(oauth.authorize_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid authorize URL: {e}")))?;
        let token_url = TokenUrl::new(oauth.token_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid token URL: {e}")))?;
        let redirect_url = RedirectUrl::new(oauth.callback_url.clone())
            .map_err(|e| ProviderError::Configuration(format!("invalid redirect URL: {e}")))?;

        let client = UnconfiguredClient::new(ClientId::new(oauth.client_id.clone()))
            .set_client_secret(ClientSecret::new(oauth.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            http: http_client()?,
            client_id: oauth.client_id.clone(),
            jwks_url: config.jwks_url.clone(),
            issuer: config.issuer.clone(),
            keys: RwLock::new(None),
        })
    }

    /// Check signature, algorithm, audience, issuer and expiry, then read the identity.
    async fn verify_id_token(&self, id_token: &str) -> Result<ProviderIdentity, ProviderError> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| ProviderError::IdToken(format!("header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| ProviderError::IdToken("missing kid".to_string()))?;
        let key = self.signing_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.client_id]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        let claims = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| ProviderError::IdToken(e.to_string()))?
            .claims;

        let expected_issuer = match &claims.tid {
            Some(tid) => self.issuer.replace("{tenantid}", tid),
            None => self.issuer.clone(),
        };
        if claims.iss != expected_issuer {
            return Err(ProviderError::IdToken(format!(
                "unexpected issuer {}",
                claims.iss
            )));
        }

        Ok(ProviderIdentity {
            email: claims
                .preferred_username
                .ok_or(ProviderError::IncompleteIdentity("preferred_username"))?,
            provider_subject: claims.oid.ok_or(ProviderError::IncompleteIdentity("oid"))?,
            display_name: claims.name,
        })
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        {
            let cached = self.keys.read().await;
            if let Some(jwk) = cached.as_ref().and_then(|keys| keys.find(kid)) {
                return decoding_key(jwk);
            }
        }

        // Unknown kid: the authority may have rotated its keys.
        debug!(kid, "fetching microsoft signing keys");
        let keys = self.fetch_keys().await?;
        let key = keys.find(kid).map(decoding_key).transpose()?;
        *self.keys.write().await = Some(keys);

        key.ok_or_else(|| ProviderError::IdToken(format!("unknown signing key {kid}")))
    }

    async fn fetch_keys(&self) -> Result<JwkSet, ProviderError> {
        self.http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProviderError::Exchange(format!("jwks: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(format!("jwks body: {e}")))
    }
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, ProviderError> {
    DecodingKey::from_jwk(jwk).map_err(|e| ProviderError::IdToken(format!("signing key: {e}")))
}

#[async_trait]
impl IdentityProvider for MicrosoftProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let challenge = pkce_challenge.as_str().to_string();

        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(MICROSOFT_SCOPES.iter().map(|s| Scope::new((*s).to_string())))
            // Always show the account picker
            .add_extra_param("prompt", "select_account")
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            binding: LoginBinding::Pkce {
                verifier: pkce_verifier.secret().clone(),
                challenge,
                challenge_method: PKCE_METHOD.to_string(),
                csrf_state: csrf_token.secret().clone(),
            },
        }
    }

    async fn exchange(
        &self,
        code: &str,
        binding: &LoginBinding,
    ) -> Result<ProviderIdentity, ProviderError> {
        let verifier = binding
            .pkce_verifier()
            .ok_or(ProviderError::MissingVerifier)?;

        let token: MicrosoftTokenResponse = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        let id_token = token
            .extra_fields()
            .id_token
            .as_deref()
            .ok_or(ProviderError::IncompleteIdentity("id_token"))?;

        self.verify_id_token(id_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::AppError;
    use crate::test_support::PRIVATE_PEM;

    const IDP_PRIVATE_PEM: &str = include_str!("../../../tests/fixtures/rs256_idp_private.pem");
    const IDP_KEY_ID: &str = "idp-key-1";
    const IDP_MODULUS: &str = "5GoOhXx1PpWXqyxXYXGq-bABTPJToZPk9jtm3shrUD66E7T9tefu0FugitLGljozfdO364MEfP-VPghZuPZMFEf-le5aY897nKg1lWfAXRNciE8PSnZCe6olP53W41YsvkyLdP6FhioPEyVzby4EgHvazTeXtrjxSvfs-cmhbEiCDbB26Nkf2Xfb4dua-3jE7iZa_rjapVrd90XZTXMN2K_NgGdh9TV5b4bLSTJVDB1fM9BtSQJule9uG6xn6PM4Kdbujsj1nIu7rZlepVoBNcICY03cxkzwql7aipZab8Ocs-oAH-UGNmTrk1OLT2JPBMrqGyL32RfH4cisLoMjpQ";

    fn config(directory: &str) -> MicrosoftConfig {
        MicrosoftConfig::for_directory(
            "ms-client".to_string(),
            "ms-secret".to_string(),
            "https://sso.example.org/auth/microsoft/callback".to_string(),
            directory,
        )
    }

    /// An authority serving the test signing key under `/contoso`.
    async fn authority() -> (MockServer, MicrosoftProvider) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/discovery/v2.0/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{ "kty": "RSA", "use": "sig", "kid": IDP_KEY_ID, "n": IDP_MODULUS, "e": "AQAB" }]
            })))
            .mount(&server)
            .await;

        let provider = MicrosoftProvider::new(&config(&format!("{}/contoso", server.uri()))).unwrap();
        (server, provider)
    }

    fn claims(server: &MockServer) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": format!("{}/contoso/v2.0", server.uri()),
            "aud": "ms-client",
            "iat": now,
            "exp": now + 600,
            "tid": "contoso-tenant",
            "preferred_username": "u1@example.org",
            "name": "User One",
            "oid": "00000000-0000-0000-0000-000000000001",
        })
    }

    fn sign(claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(IDP_KEY_ID.to_string());
        let key = EncodingKey::from_rsa_pem(IDP_PRIVATE_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    fn pkce_binding() -> LoginBinding {
        LoginBinding::Pkce {
            verifier: "verifier-1".to_string(),
            challenge: "challenge-1".to_string(),
            challenge_method: PKCE_METHOD.to_string(),
            csrf_state: "ms-state".to_string(),
        }
    }

    #[test]
    fn authorization_url_carries_pkce_challenge_and_account_picker() {
        let provider =
            MicrosoftProvider::new(&config("https://login.microsoftonline.com/contoso/")).unwrap();
        let req = provider.authorization_request();

        let url = Url::parse(&req.url).unwrap();
        assert_eq!(
            url.as_str().split('?').next(),
            Some("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize")
        );

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "ms-client");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], "User.Read email profile openid");

        let LoginBinding::Pkce {
            verifier,
            challenge,
            csrf_state,
            ..
        } = &req.binding
        else {
            panic!("expected a PKCE binding");
        };
        assert!(!verifier.is_empty());
        assert_eq!(&params["code_challenge"], challenge);
        assert_eq!(&params["state"], csrf_state);
    }

    #[test]
    fn each_attempt_gets_a_fresh_verifier() {
        let provider =
            MicrosoftProvider::new(&config("https://login.microsoftonline.com/contoso")).unwrap();
        let a = provider.authorization_request().binding;
        let b = provider.authorization_request().binding;
        assert_ne!(a.pkce_verifier(), b.pkce_verifier());
        assert_ne!(a.csrf_state(), b.csrf_state());
    }

    #[tokio::test]
    async fn exchange_sends_verifier_and_reads_the_verified_id_token() {
        let (server, provider) = authority().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "id_token": sign(&claims(&server)),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let identity = provider.exchange("auth-code", &pkce_binding()).await.unwrap();
        assert_eq!(identity.email, "u1@example.org");
        assert_eq!(identity.display_name.as_deref(), Some("User One"));
        assert_eq!(
            identity.provider_subject,
            "00000000-0000-0000-0000-000000000001"
        );
    }

    #[tokio::test]
    async fn token_response_without_id_token_is_incomplete() {
        let (server, provider) = authority().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ms-access",
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;

        let err = provider.exchange("auth-code", &pkce_binding()).await.unwrap_err();
        assert!(matches!(err, ProviderError::IncompleteIdentity("id_token")));
    }

    #[tokio::test]
    async fn rejected_code_is_an_opaque_server_error() {
        let (server, provider) = authority().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: code expired",
            })))
            .mount(&server)
            .await;

        let err: AppError = provider
            .exchange("auth-code", &pkce_binding())
            .await
            .unwrap_err()
            .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Unable to grant access");
    }

    #[tokio::test]
    async fn exchange_without_verifier_never_calls_the_token_endpoint() {
        let (server, provider) = authority().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let binding = LoginBinding::State {
            csrf_state: "ms-state".to_string(),
        };
        let err = provider.exchange("auth-code", &binding).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingVerifier));
    }

    #[tokio::test]
    async fn unsigned_id_token_is_rejected() {
        let (server, provider) = authority().await;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT","kid":"idp-key-1"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims(&server).to_string());

        let err = provider
            .verify_id_token(&format!("{header}.{payload}."))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::IdToken(_)));
    }

    #[tokio::test]
    async fn id_token_for_another_client_is_rejected() {
        let (server, provider) = authority().await;
        let mut claims = claims(&server);
        claims["aud"] = json!("some-other-client");

        let err = provider.verify_id_token(&sign(&claims)).await.unwrap_err();
        assert!(matches!(err, ProviderError::IdToken(_)));
    }

    #[tokio::test]
    async fn id_token_from_another_issuer_is_rejected() {
        let (server, provider) = authority().await;
        let mut claims = claims(&server);
        claims["iss"] = json!("https://evil.example/");

        let err = provider.verify_id_token(&sign(&claims)).await.unwrap_err();
        assert!(matches!(err, ProviderError::IdToken(_)));
    }

    #[tokio::test]
    async fn expired_id_token_is_rejected() {
        let (server, provider) = authority().await;
        let mut claims = claims(&server);
        claims["exp"] = json!(Utc::now().timestamp() - 3600);

        let err = provider.verify_id_token(&sign(&claims)).await.unwrap_err();
        assert!(matches!(err, ProviderError::IdToken(_)));
    }

    #[tokio::test]
    async fn id_token_signed_with_another_key_is_rejected() {
        let (server, provider) = authority().await;

        // Right kid, wrong algorithm and key.
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(IDP_KEY_ID.to_string());
        let key = EncodingKey::from_ec_pem(PRIVATE_PEM.as_bytes()).unwrap();
        let forged = jsonwebtoken::encode(&header, &claims(&server), &key).unwrap();
        assert!(matches!(
            provider.verify_id_token(&forged).await,
            Err(ProviderError::IdToken(_))
        ));

        // Unknown kid.
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("rotated-away".to_string());
        let key = EncodingKey::from_rsa_pem(IDP_PRIVATE_PEM.as_bytes()).unwrap();
        let unknown = jsonwebtoken::encode(&header, &claims(&server), &key).unwrap();
        assert!(matches!(
            provider.verify_id_token(&unknown).await,
            Err(ProviderError::IdToken(_))
        ));
    }

    #[tokio::test]
    async fn signing_keys_are_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/discovery/v2.0/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{ "kty": "RSA", "kid": IDP_KEY_ID, "n": IDP_MODULUS, "e": "AQAB" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let provider = MicrosoftProvider::new(&config(&format!("{}/contoso", server.uri()))).unwrap();

        let token = sign(&claims(&server));
        provider.verify_id_token(&token).await.unwrap();
        provider.verify_id_token(&token).await.unwrap();
    }

    #[tokio::test]
    async fn multi_tenant_issuer_is_matched_against_the_token_tenant() {
        let (server, _) = authority().await;
        let mut cfg = config(&format!("{}/contoso", server.uri()));
        cfg.issuer = format!("{}/{{tenantid}}/v2.0", server.uri());
        let provider = MicrosoftProvider::new(&cfg).unwrap();

        let mut claims = claims(&server);
        claims["iss"] = json!(format!("{}/contoso-tenant/v2.0", server.uri()));
        provider.verify_id_token(&sign(&claims)).await.unwrap();

        claims["tid"] = json!("fabrikam-tenant");
        assert!(matches!(
            provider.verify_id_token(&sign(&claims)).await,
            Err(ProviderError::IdToken(_))
        ));
    }

    #[tokio::test]
    async fn id_token_without_username_is_incomplete() {
        let (server, provider) = authority().await;
        let mut claims = claims(&server);
        claims.as_object_mut().unwrap().remove("preferred_username");

        assert!(matches!(
            provider.verify_id_token(&sign(&claims)).await,
            Err(ProviderError::IncompleteIdentity("preferred_username"))
        ));
    }
}
