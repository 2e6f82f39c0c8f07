/*
 * Responsibility
 * - Load Config -> build dependencies -> assemble the Router
 * - Apply middleware (security headers / CORS / HTTP layers)
 * - Start with axum::serve()
 */
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::{AppEnv, Config};
use crate::middleware::{cors, http, security_headers};
use crate::repos::{PgUserRepo, UserStore};
use crate::services::auth::build_token_service;
use crate::services::cache::{MemoryCache, ValkeyClient};
use crate::services::session::{CacheSessionStore, SessionStore};
use crate::services::sso::{GoogleProvider, MicrosoftProvider, Providers};
use crate::state::{AppState, AuthSettings};

pub async fn run() -> Result<()> {
    init_tracing();

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "invalid configuration"))?;
    init_panic_hook(config.app_env);
    info!(env = ?config.app_env, addr = %config.addr, "configuration loaded");

    let db = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let users: Arc<dyn UserStore> = Arc::new(PgUserRepo::new(db));

    let sessions = build_session_store(&config).await?;

    let providers = Providers::new(
        Arc::new(MicrosoftProvider::new(&config.microsoft)?),
        Arc::new(GoogleProvider::new(&config.google)?),
    );

    let auth = build_token_service(&config, users.clone())?;

    let state = AppState::new(
        auth,
        sessions,
        users,
        providers,
        AuthSettings::from_config(&config),
        config.session_secret_key.as_bytes(),
    );

    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_router(state: AppState, config: &Config) -> Router {
    let routes = api::routes(state.clone());
    let routes = if config.path_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&config.path_prefix, routes)
    };

    let router = routes.with_state(state);
    let router = security_headers::apply(router);
    let router = cors::apply(router, config);
    http::apply(router)
}

async fn build_session_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    let ttl = Duration::from_secs(config.session_ttl_seconds);

    match &config.redis_url {
        Some(url) => {
            let cache = ValkeyClient::new(url).await?;
            info!("session store: valkey");
            Ok(Arc::new(CacheSessionStore::new(cache, ttl)))
        }
        None => {
            warn!("REDIS_URL not set; sessions are kept in process memory");
            Ok(Arc::new(CacheSessionStore::new(MemoryCache::new(), ttl)))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(env: AppEnv) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(panic = %panic_info, "panic");
        if env.is_production() {
            default_hook(panic_info);
        } else {
            std::process::abort();
        }
    }));
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
