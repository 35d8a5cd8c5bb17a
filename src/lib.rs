use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Modules ---

// Identity, credentials and access decisions.
pub mod auth;
pub mod password;
pub mod policy;

// Request handling and persistence.
pub mod handlers;
pub mod models;
pub mod repository;

// Ambient concerns.
pub mod config;
pub mod error;
pub mod rate_limit;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use rate_limit::RateLimiter;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// Prefix shared by every versioned API route.
pub const API_V1_STR: &str = "/api/v1";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// ApiDoc
///
/// The OpenAPI document (served at `/api-docs/openapi.json`), aggregated from the
/// `#[utoipa::path]` handlers and `ToSchema` models.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::get_user, handlers::login,
        handlers::list_posts, handlers::get_post, handlers::create_post,
        handlers::update_post, handlers::delete_post,
        handlers::get_me, handlers::change_password,
        handlers::list_users, handlers::delete_user, handlers::update_user_status,
        handlers::list_all_posts, handlers::delete_any_post
    ),
    components(
        schemas(
            models::Role, models::Post, models::UserResponse, models::RegisterUserRequest,
            models::LoginRequest, models::TokenResponse, models::CreatePostRequest,
            models::UpdatePostRequest, models::ChangePasswordRequest,
            models::UpdateUserStatusRequest, models::MessageResponse, error::ErrorResponse,
        )
    ),
    tags(
        (name = "blog-api", description = "Multi-user blog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cheaply clonable container shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Per-client request budget.
    pub limiter: RateLimiter,
}

impl AppState {
    /// Builds the state, sizing the rate limiter from `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            repo,
            config,
            limiter,
        }
    }
}

// --- Sub-state access for extractors ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Enforces authentication for `authenticated_routes`. A failed `AuthUser` extraction
/// rejects the request before the handler runs; on success the resolved principal is left
/// in the request extensions for the handler's own extractor.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Builds the full application router around `state`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    // 1. Versioned API. Admin handlers take `AdminUser`, which is their only guard.
    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest("/admin", admin::admin_routes());

    // 2. Root routes, docs and the per-client budget.
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::root_routes())
        .nest(API_V1_STR, api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state);

    // 3. Request ids and tracing wrap everything, including rate-limited responses.
    app
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(request_span)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(request_id_header)),
        )
        .layer(cors)
}

/// Span for one HTTP request, tagged with the id assigned by `SetRequestIdLayer` so all log
/// lines of the request correlate.
fn request_span(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
