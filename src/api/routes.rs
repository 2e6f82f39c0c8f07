/*
 * Responsibility
 * - URL structure of the service
 *   - /health
 *   - /auth/...: provider login, callback, token exchange, logout, token info
 *   - /user/...: protected user API, each group behind required_auth(level)
 * - The auth-context middleware wraps everything, so every handler sees an AuthContext
 */
use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::api::handlers::{auth, health::health, sso, token, users};
use crate::domain::PrivilegeLevel;
use crate::middleware::auth::{access, required_auth};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes())
        .nest("/user", user_routes());

    access::apply(router, state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(auth::index))
        .route("/token", get(token::exchange_token).post(token::refresh_token))
        .route("/logout", get(auth::logout))
        .route("/token_info", get(auth::token_info))
        .route("/{provider}", get(sso::begin_login))
        .route("/{provider}/callback", get(sso::login_callback))
        .fallback(auth::unknown_auth_route)
}

fn user_routes() -> Router<AppState> {
    let any_user = Router::new()
        .route("/me", get(users::me))
        .route("/groups", get(users::groups))
        .route_layer(middleware::from_fn_with_state(
            PrivilegeLevel::Unprivileged,
            required_auth,
        ));

    let staff = Router::new()
        .route("/list/{user_id}", get(users::get_user))
        .route("/create", post(users::create_user))
        .route("/delete/{user_id}", post(users::delete_user))
        .route_layer(middleware::from_fn_with_state(
            PrivilegeLevel::Teacher,
            required_auth,
        ));

    any_user.merge(staff)
}
