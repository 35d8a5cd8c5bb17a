use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any active principal holding a valid bearer token. The `auth_middleware`
/// layer added in `create_router` rejects everyone else with 401 before the handler runs;
/// per-post ownership is decided inside the handlers through `policy`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /posts
        // The author is always the caller.
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        // Author or admin only; a missing post is 404 before any ownership check.
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // GET /profile/me
        .route("/profile/me", get(handlers::get_me))
        // PUT /profile/change-password
        // Requires the current password.
        .route("/profile/change-password", put(handlers::change_password))
}
