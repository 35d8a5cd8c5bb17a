use crate::{
    AppState,
    auth::{AdminUser, AuthUser, issue_token},
    error::{ApiError, ApiResult},
    models::{
        ChangePasswordRequest, CreatePostRequest, LoginRequest, MessageResponse, NewUser, Post,
        RegisterUserRequest, Role, TokenResponse, UpdatePostRequest, UpdateUserStatusRequest,
        UserResponse,
    },
    password::{hash_password, validate_password_strength, verify_password},
    policy::{self, Operation, PostAction},
};
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
};
use chrono::Duration;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Upper bound on `limit` for the public post listing.
pub const MAX_PAGE_SIZE: i64 = 100;

// --- Extractors & Filter Structs ---

/// ValidJson
///
/// `axum::Json` with body rejections (malformed JSON, missing fields) reported as
/// `ApiError::Validation` instead of axum's plain-text response.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ValidJson<T>(pub T);

/// ValidPath
///
/// `axum::extract::Path` whose parse failures (e.g. an id that is not a UUID) become
/// `ApiError::Validation`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ValidPath<T>(pub T);

/// ValidQuery
///
/// `axum::extract::Query` with the same rejection mapping as [`ValidPath`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ValidQuery<T>(pub T);

/// PostListParams
///
/// Offset/limit paging for GET /posts.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PostListParams {
    /// Number of posts to skip (default 0).
    pub skip: Option<i64>,
    /// Maximum number of posts to return (default and max 100).
    pub limit: Option<i64>,
}

impl PostListParams {
    fn bounds(&self) -> ApiResult<(i64, i64)> {
        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(MAX_PAGE_SIZE);
        if skip < 0 || limit < 0 {
            return Err(ApiError::Validation {
                message: "skip and limit must be non-negative".to_string(),
                details: None,
            });
        }
        Ok((skip, limit.min(MAX_PAGE_SIZE)))
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_or_internal(password: &str) -> ApiResult<String> {
    hash_password(password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        ApiError::Internal
    })
}

// --- Public: Accounts & Authentication ---

/// register_user
///
/// [Public Route] Creates a new account. The role defaults to `user`; asking for `admin` is
/// refused. The password must satisfy the complexity rule and is stored only as an argon2 hash.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = UserResponse),
        (status = 400, description = "Password does not meet the complexity rule"),
        (status = 403, description = "Admin role requested"),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Malformed payload")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<RegisterUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    tracing::info!(%email, "creating user");

    let role = payload.role.unwrap_or_default();
    policy::authorize(None, Operation::Register { requested_role: role })?;

    validate_password_strength(&payload.password)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    // Checked up front for a clear error; the unique constraint still guards the race.
    if state.repo.get_user_by_email(&email).await?.is_some() {
        tracing::warn!(%email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_or_internal(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            email,
            password_hash,
            role,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// get_user
///
/// [Public Route] Looks up a single account by id.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    state
        .repo
        .get_user(id)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token.
///
/// Unknown email and wrong password are indistinguishable to the caller (401).
/// A deactivated account with correct credentials gets `INACTIVE_USER`.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Inactive user"),
        (status = 401, description = "Incorrect email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&payload.email);
    tracing::info!(%email, "login attempt");

    let user = match state.repo.get_user_by_email(&email).await? {
        Some(user) if verify_password(&payload.password, &user.password_hash) => user,
        _ => {
            tracing::warn!(%email, "failed login attempt");
            return Err(ApiError::Unauthorized(
                "Incorrect email or password".to_string(),
            ));
        }
    };

    if !user.is_active {
        return Err(ApiError::Inactive);
    }

    let ttl = Duration::try_minutes(state.config.access_token_expire_minutes).ok_or_else(|| {
        tracing::error!(
            minutes = state.config.access_token_expire_minutes,
            "token lifetime out of range"
        );
        ApiError::Internal
    })?;
    let access_token = issue_token(&state.config.jwt_secret, user.id, user.role, ttl)
        .map_err(|e| {
            tracing::error!(error = %e, "token issue failed");
            ApiError::Internal
        })?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: ttl.num_seconds(),
    }))
}

// --- Public: Posts ---

/// list_posts
///
/// [Public Route] Lists posts, newest first, with offset/limit paging.
#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(PostListParams),
    responses((status = 200, description = "Posts", body = [Post]))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<PostListParams>,
) -> ApiResult<Json<Vec<Post>>> {
    let (skip, limit) = params.bounds()?;
    Ok(Json(state.repo.list_posts(skip, limit).await?))
}

/// get_post
///
/// [Public Route] Retrieves a single post by id.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> ApiResult<Json<Post>> {
    state
        .repo
        .get_post(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

// --- Authenticated: Posts ---

/// create_post
///
/// [Authenticated Route] Publishes a new post. The author is always the caller.
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 401, description = "Not authenticated"),
        (status = 422, description = "Malformed payload")
    )
)]
pub async fn create_post(
    caller: AuthUser,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    payload.validate()?;

    let post = state.repo.create_post(caller.id, payload).await?;
    tracing::info!(post_id = %post.id, author_id = %caller.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Partially updates a post.
///
/// *Authorization*: existence first (404), then author-or-admin (403).
#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_post(
    caller: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(payload): ValidJson<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    payload.validate()?;

    let existing = state.repo.get_post(id).await?;
    let post = policy::authorize_post(&caller, PostAction::Update, existing).inspect_err(|_| {
        tracing::warn!(post_id = %id, caller_id = %caller.id, "post update refused");
    })?;

    state
        .repo
        .update_post(post.id, payload)
        .await?
        .map(Json)
        // Deleted between the read and the write.
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

/// delete_post
///
/// [Authenticated Route] Removes a post. Same authorization as `update_post`.
#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    caller: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let existing = state.repo.get_post(id).await?;
    let post = policy::authorize_post(&caller, PostAction::Delete, existing).inspect_err(|_| {
        tracing::warn!(post_id = %id, caller_id = %caller.id, "post delete refused");
    })?;

    if !state.repo.delete_post(post.id).await? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }

    tracing::info!(post_id = %id, caller_id = %caller.id, "post deleted");
    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

// --- Authenticated: Profile ---

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/api/v1/profile/me",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(caller: AuthUser, State(state): State<AppState>) -> ApiResult<Json<UserResponse>> {
    tracing::info!(user_id = %caller.id, "fetching profile");

    state
        .repo
        .get_user(caller.id)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// change_password
///
/// [Authenticated Route] Replaces the caller's password. The current password must be
/// supplied and correct, and the new one must satisfy the complexity rule.
#[utoipa::path(
    put,
    path = "/api/v1/profile/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Changed", body = MessageResponse),
        (status = 400, description = "Incorrect old password or weak new password")
    )
)]
pub async fn change_password(
    caller: AuthUser,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    tracing::info!(user_id = %caller.id, "changing password");

    let user = state
        .repo
        .get_user(caller.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.old_password, &user.password_hash) {
        tracing::warn!(user_id = %caller.id, "password change refused: incorrect old password");
        return Err(ApiError::InvalidInput("Incorrect old password".to_string()));
    }

    validate_password_strength(&payload.new_password)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let password_hash = hash_or_internal(&payload.new_password)?;
    if !state.repo.update_password(caller.id, password_hash).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %caller.id, "password changed");
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

// --- Admin ---

/// list_users
///
/// [Admin Route] Every account in the system.
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_users(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    tracing::info!(admin = %admin.email, "admin fetching all users");

    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// delete_user
///
/// [Admin Route] Deletes an account together with every post it authored.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    tracing::info!(admin = %admin.email, user_id = %id, "admin deleting user");

    if !state.repo.delete_user(id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// update_user_status
///
/// [Admin Route] Activates or deactivates an account. Deactivated principals can neither log
/// in nor use tokens issued before the change.
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/status",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserStatusRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(payload): ValidJson<UpdateUserStatusRequest>,
) -> ApiResult<Json<UserResponse>> {
    tracing::info!(
        admin = %admin.email,
        user_id = %id,
        is_active = payload.is_active,
        "admin updating user status"
    );

    state
        .repo
        .set_user_active(id, payload.is_active)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// list_all_posts
///
/// [Admin Route] Every post, without paging.
#[utoipa::path(
    get,
    path = "/api/v1/admin/posts",
    responses(
        (status = 200, description = "All posts", body = [Post]),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_all_posts(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Post>>> {
    tracing::info!(admin = %admin.email, "admin fetching all posts");
    Ok(Json(state.repo.list_all_posts().await?))
}

/// delete_any_post
///
/// [Admin Route] Force-deletes a post regardless of its author.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_any_post(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    tracing::info!(admin = %admin.email, post_id = %id, "admin deleting post");

    if !state.repo.delete_post(id).await? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

// --- Startup ---

/// seed_admin
///
/// Ensures a bootstrap administrator exists. Called once at startup when `ADMIN_EMAIL` and
/// `ADMIN_PASSWORD` are configured; an existing account with that email is left untouched.
pub async fn seed_admin(state: &AppState, email: &str, password: &str) -> ApiResult<UserResponse> {
    let email = normalize_email(email);
    if let Some(existing) = state.repo.get_user_by_email(&email).await? {
        if existing.role != Role::Admin {
            tracing::warn!(%email, "bootstrap admin email belongs to a non-admin account");
        }
        return Ok(existing.into());
    }

    validate_password_strength(password).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    let user = state
        .repo
        .create_user(NewUser {
            email,
            password_hash: hash_or_internal(password)?,
            role: Role::Admin,
        })
        .await?;

    tracing::info!(user_id = %user.id, "bootstrap admin created");
    Ok(user.into())
}
