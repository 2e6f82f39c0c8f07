/*
 * Responsibility
 * - Load settings from environment variables (DATABASE_URL, keys, provider credentials, ...)
 * - Validate values (a missing required value fails startup)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Credentials and endpoints for one OAuth2 identity provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the client secret
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("callback_url", &self.callback_url)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MicrosoftConfig {
    pub oauth: ProviderConfig,
    /// Signing keys for the `id_token`.
    pub jwks_url: String,
    /// Expected `iss` of the `id_token`. `{tenantid}` is replaced by the token's `tid`.
    pub issuer: String,
}

impl MicrosoftConfig {
    /// Endpoints of a Microsoft identity platform authority, e.g.
    /// `https://login.microsoftonline.com/common`.
    pub fn for_directory(
        client_id: String,
        client_secret: String,
        callback_url: String,
        directory_url: &str,
    ) -> Self {
        let directory = directory_url.trim_end_matches('/');
        Self {
            oauth: ProviderConfig {
                client_id,
                client_secret,
                callback_url,
                authorize_url: format!("{directory}/oauth2/v2.0/authorize"),
                token_url: format!("{directory}/oauth2/v2.0/token"),
            },
            jwks_url: format!("{directory}/discovery/v2.0/keys"),
            issuer: directory_issuer(directory),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub oauth: ProviderConfig,
    pub tokeninfo_url: String,
    pub userinfo_url: String,
}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub app_domain: String,
    pub path_prefix: String,
    pub panel_path: String,

    pub database_url: String,
    pub redis_url: Option<String>,

    pub session_secret_key: String,
    pub session_ttl_seconds: u64,

    pub jwt_sign_key_pem: String,
    pub jwt_verify_key_pem: String,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub access_token_leeway_seconds: u64,

    pub microsoft: MicrosoftConfig,
    pub google: GoogleConfig,

    pub cors_allowed_origins: Vec<String>,
}

pub const MIN_SESSION_SECRET_LEN: usize = 32;
const DEFAULT_MS_DIRECTORY_URL: &str = "https://login.microsoftonline.com/common";
const MULTI_TENANT_DIRECTORIES: &[&str] = &["common", "organizations", "consumers"];

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/userinfo/v2/me";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("APP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8088);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("APP_PORT"))?;

        let app_env = AppEnv::from_env();

        let app_domain = std::env::var("APP_DOMAIN")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        Url::parse(&app_domain).map_err(|_| ConfigError::Invalid("APP_DOMAIN"))?;

        let path_prefix = normalize_prefix(&std::env::var("APP_PATH_PREFIX").unwrap_or_default());

        let panel_path = std::env::var("PANEL_PATH").unwrap_or_else(|_| "/panel".to_string());

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        if redis_url.is_none() && app_env.is_production() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        let session_secret_key = std::env::var("SESSION_SECRET_KEY")
            .map_err(|_| ConfigError::Missing("SESSION_SECRET_KEY"))?;
        if session_secret_key.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid("SESSION_SECRET_KEY"));
        }

        let session_ttl_seconds = env_u64("SESSION_TTL_SECONDS", 600);

        let jwt_sign_key_pem = read_pem("JWT_SIGN_KEY_PATH")?;
        let jwt_verify_key_pem = read_pem("JWT_VERIFY_KEY_PATH")?;

        let jwt_issuer =
            std::env::var("JWT_SIGN_ISSUER").map_err(|_| ConfigError::Missing("JWT_SIGN_ISSUER"))?;

        let access_token_ttl_seconds = env_u64("ACCESS_TOKEN_TTL_SECONDS", 4 * 60 * 60);
        let refresh_token_ttl_seconds = env_u64("REFRESH_TOKEN_TTL_SECONDS", 12 * 60 * 60);
        let access_token_leeway_seconds = env_u64("ACCESS_TOKEN_LEEWAY_SECONDS", 0);

        let mut microsoft = MicrosoftConfig::for_directory(
            std::env::var("MS_AUTH_CLIENT_ID").map_err(|_| ConfigError::Missing("MS_AUTH_CLIENT_ID"))?,
            std::env::var("MS_AUTH_CLIENT_SECRET")
                .map_err(|_| ConfigError::Missing("MS_AUTH_CLIENT_SECRET"))?,
            std::env::var("MS_AUTH_LOGIN_CALLBACK")
                .unwrap_or_else(|_| format!("{}/auth/microsoft/callback", app_domain)),
            &std::env::var("MS_AUTH_DIRECTORY_URL")
                .unwrap_or_else(|_| DEFAULT_MS_DIRECTORY_URL.to_string()),
        );
        if let Ok(issuer) = std::env::var("MS_AUTH_ISSUER") {
            microsoft.issuer = issuer;
        }

        let google = GoogleConfig {
            oauth: ProviderConfig {
                client_id: std::env::var("GOOGLE_AUTH_CLIENT_ID")
                    .map_err(|_| ConfigError::Missing("GOOGLE_AUTH_CLIENT_ID"))?,
                client_secret: std::env::var("GOOGLE_AUTH_CLIENT_SECRET")
                    .map_err(|_| ConfigError::Missing("GOOGLE_AUTH_CLIENT_SECRET"))?,
                callback_url: std::env::var("GOOGLE_AUTH_LOGIN_CALLBACK")
                    .unwrap_or_else(|_| format!("{}/auth/google/callback", app_domain)),
                authorize_url: env_or("GOOGLE_AUTH_URL", GOOGLE_AUTH_URL),
                token_url: env_or("GOOGLE_TOKEN_URL", GOOGLE_TOKEN_URL),
            },
            tokeninfo_url: env_or("GOOGLE_TOKENINFO_URL", GOOGLE_TOKENINFO_URL),
            userinfo_url: env_or("GOOGLE_USERINFO_URL", GOOGLE_USERINFO_URL),
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        Ok(Self {
            addr,
            app_env,
            app_domain,
            path_prefix,
            panel_path,
            database_url,
            redis_url,
            session_secret_key,
            session_ttl_seconds,
            jwt_sign_key_pem,
            jwt_verify_key_pem,
            jwt_issuer,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            access_token_leeway_seconds,
            microsoft,
            google,
            cors_allowed_origins,
        })
    }

    /// Host part of `APP_DOMAIN`, used as the cookie domain.
    pub fn cookie_domain(&self) -> Option<String> {
        cookie_domain_from(&self.app_domain)
    }
}

fn env_u64(key: &'static str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_or(key: &'static str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_pem(key: &'static str) -> Result<String, ConfigError> {
    let path = std::env::var(key).map_err(|_| ConfigError::Missing(key))?;
    std::fs::read_to_string(&path)
        .map(|pem| pem.replace("\\n", "\n"))
        .map_err(|_| ConfigError::Invalid(key))
}

/// `""`, `"/"` -> `""`; `"api/"` -> `"/api"`.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

// Multi-tenant authorities sign with the user's tenant as issuer.
fn directory_issuer(directory: &str) -> String {
    match directory.rsplit_once('/') {
        Some((authority, tenant)) if MULTI_TENANT_DIRECTORIES.contains(&tenant) => {
            format!("{authority}/{{tenantid}}/v2.0")
        }
        _ => format!("{directory}/v2.0"),
    }
}

// Browsers reject an explicit Domain attribute for localhost and bare IPs.
pub fn cookie_domain_from(app_domain: &str) -> Option<String> {
    let url = Url::parse(app_domain).ok()?;
    match url.host()? {
        url::Host::Domain(host) if host != "localhost" => Some(host.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_domain_is_the_app_domain_host() {
        assert_eq!(
            cookie_domain_from("https://sso.campus.example.org/base"),
            Some("sso.campus.example.org".to_string())
        );
    }

    #[test]
    fn cookie_domain_is_omitted_for_localhost_and_ips() {
        assert_eq!(cookie_domain_from("http://localhost:8088"), None);
        assert_eq!(cookie_domain_from("http://127.0.0.1:8088"), None);
        assert_eq!(cookie_domain_from("not a url"), None);
    }

    #[test]
    fn microsoft_endpoints_follow_the_directory() {
        let ms = MicrosoftConfig::for_directory(
            "id".into(),
            "secret".into(),
            "https://sso.example.org/auth/microsoft/callback".into(),
            "https://login.microsoftonline.com/contoso/",
        );
        assert_eq!(
            ms.oauth.token_url,
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert_eq!(
            ms.jwks_url,
            "https://login.microsoftonline.com/contoso/discovery/v2.0/keys"
        );
        assert_eq!(ms.issuer, "https://login.microsoftonline.com/contoso/v2.0");
    }

    #[test]
    fn multi_tenant_directory_issuer_is_a_template() {
        assert_eq!(
            directory_issuer("https://login.microsoftonline.com/common"),
            "https://login.microsoftonline.com/{tenantid}/v2.0"
        );
        assert_eq!(
            directory_issuer("https://login.microsoftonline.com/organizations"),
            "https://login.microsoftonline.com/{tenantid}/v2.0"
        );
    }

    #[test]
    fn path_prefix_gets_one_leading_slash() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/sso/v1/"), "/sso/v1");
    }
}
