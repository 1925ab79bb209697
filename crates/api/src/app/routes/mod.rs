use axum::{Router, routing::get};

pub mod admin;
pub mod auth;
pub mod system;
pub mod users;

/// Router for endpoints reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .merge(users::public_router())
}

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(users::protected_router())
        .nest("/admin", admin::router())
}
