use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// Moderation endpoints, nested under `/admin`. Every handler takes an `AdminUser`, so a
/// non-admin is refused before the repository is touched.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/users
        .route("/users", get(handlers::list_users))
        // DELETE /admin/users/{id}
        // Cascades to every post the user authored.
        .route("/users/{id}", delete(handlers::delete_user))
        // PUT /admin/users/{id}/status
        // Activates or deactivates an account.
        .route("/users/{id}/status", put(handlers::update_user_status))
        // GET /admin/posts
        .route("/posts", get(handlers::list_all_posts))
        // DELETE /admin/posts/{id}
        // Force delete, regardless of author.
        .route("/posts/{id}", delete(handlers::delete_any_post))
}
