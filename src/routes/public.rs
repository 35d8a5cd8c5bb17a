use crate::{AppState, handlers, models::MessageResponse};
use axum::{
    Json, Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated**: read-only access to posts and accounts plus the
/// gateway functions (registration and login). Mounted under `/api/v1`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /users
        // Registration. Passwords must satisfy the complexity rule; duplicates are 409.
        .route("/users", post(handlers::register_user))
        // GET /users/{id}
        .route("/users/{id}", get(handlers::get_user))
        // POST /auth/login
        // Exchanges credentials for a bearer token.
        .route("/auth/login", post(handlers::login))
        // GET /posts?skip=...&limit=...
        .route("/posts", get(handlers::list_posts))
        // GET /posts/{id}
        .route("/posts/{id}", get(handlers::get_post))
}

/// Unversioned routes mounted at the root: welcome message and health check.
pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(|| async { Json(MessageResponse::new("Welcome to the Blog API")) }),
        )
        // GET /health
        // Used for monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
}
