use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use blog_api::{
    AppConfig, AppState, ApiError, InMemoryRepository,
    auth::{AdminUser, AuthUser, verify_token},
    handlers::{self, PostListParams, ValidJson, ValidPath, ValidQuery},
    models::{
        ChangePasswordRequest, CreatePostRequest, LoginRequest, Post, RegisterUserRequest, Role,
        UpdatePostRequest, UpdateUserStatusRequest, UserResponse,
    },
    repository::RepositoryState,
};
use std::sync::Arc;
use uuid::Uuid;

// --- TEST UTILITIES ---

const PASSWORD: &str = "Passw0rdOk";

fn create_test_state() -> AppState {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    AppState::new(repo, AppConfig::default())
}

async fn register(state: &AppState, email: &str) -> UserResponse {
    let (status, Json(user)) = handlers::register_user(
        State(state.clone()),
        ValidJson(RegisterUserRequest {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            role: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    user
}

async fn seed_admin(state: &AppState) -> AuthUser {
    let admin = handlers::seed_admin(state, "admin@blog.io", "AdminPass1")
        .await
        .unwrap();
    AuthUser {
        id: admin.id,
        email: admin.email,
        role: admin.role,
    }
}

fn as_caller(user: &UserResponse) -> AuthUser {
    AuthUser {
        id: user.id,
        email: user.email.clone(),
        role: user.role,
    }
}

async fn create_post(state: &AppState, caller: &AuthUser, title: &str) -> Post {
    let (status, Json(post)) = handlers::create_post(
        caller.clone(),
        State(state.clone()),
        ValidJson(CreatePostRequest {
            title: title.to_string(),
            content: "body".to_string(),
            published: true,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    post
}

// --- REGISTRATION & LOGIN ---

#[tokio::test]
async fn test_register_user_defaults_to_user_role() {
    let state = create_test_state();
    let user = register(&state, "Alice@Example.com").await;

    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.role, Role::User);
    assert!(user.is_active);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let state = create_test_state();
    register(&state, "dup@example.com").await;

    let err = handlers::register_user(
        State(state.clone()),
        ValidJson(RegisterUserRequest {
            email: "DUP@example.com".to_string(),
            password: PASSWORD.to_string(),
            role: None,
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.to_string(), "Email already registered");
}

#[tokio::test]
async fn test_register_rejects_weak_password() {
    let state = create_test_state();

    for weak in ["short1A", "alllowercase1", "ALLUPPERCASE1", "NoDigitsHere"] {
        let err = handlers::register_user(
            State(state.clone()),
            ValidJson(RegisterUserRequest {
                email: "weak@example.com".to_string(),
                password: weak.to_string(),
                role: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST, "accepted {weak}");
    }
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let state = create_test_state();
    let err = handlers::register_user(
        State(state),
        ValidJson(RegisterUserRequest {
            email: "not-an-email".to_string(),
            password: PASSWORD.to_string(),
            role: None,
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_register_as_admin_is_forbidden() {
    let state = create_test_state();
    let err = handlers::register_user(
        State(state),
        ValidJson(RegisterUserRequest {
            email: "sneaky@example.com".to_string(),
            password: PASSWORD.to_string(),
            role: Some(Role::Admin),
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_issues_verifiable_token() {
    let state = create_test_state();
    let user = register(&state, "login@example.com").await;

    let Json(token) = handlers::login(
        State(state.clone()),
        ValidJson(LoginRequest {
            email: "login@example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(token.token_type, "bearer");
    assert_eq!(token.expires_in, 30 * 60);
    let verified = verify_token(&state.config.jwt_secret, &token.access_token).unwrap();
    assert_eq!(verified.principal_id, user.id);
    assert_eq!(verified.role, Role::User);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let state = create_test_state();
    register(&state, "known@example.com").await;

    let wrong_password = handlers::login(
        State(state.clone()),
        ValidJson(LoginRequest {
            email: "known@example.com".to_string(),
            password: "Wrong1Password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    let unknown_email = handlers::login(
        State(state.clone()),
        ValidJson(LoginRequest {
            email: "ghost@example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_inactive_user() {
    let state = create_test_state();
    let user = register(&state, "sleepy@example.com").await;
    state.repo.set_user_active(user.id, false).await.unwrap();

    let err = handlers::login(
        State(state),
        ValidJson(LoginRequest {
            email: "sleepy@example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::Inactive));
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_user_not_found() {
    let state = create_test_state();
    let err = handlers::get_user(State(state), ValidPath(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

// --- POSTS ---

#[tokio::test]
async fn test_create_post_sets_caller_as_author() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "author@example.com").await);

    let post = create_post(&state, &author, "Hello").await;
    assert_eq!(post.author_id, author.id);
    assert!(post.published);

    let Json(fetched) = handlers::get_post(State(state), ValidPath(post.id)).await.unwrap();
    assert_eq!(fetched, post);
}

#[tokio::test]
async fn test_create_post_rejects_empty_title() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "author@example.com").await);

    let err = handlers::create_post(
        author,
        State(state),
        ValidJson(CreatePostRequest {
            title: String::new(),
            content: "body".to_string(),
            published: true,
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_list_posts_paging() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "pager@example.com").await);
    for i in 0..5 {
        create_post(&state, &author, &format!("post {i}")).await;
    }

    let Json(page) = handlers::list_posts(
        State(state.clone()),
        ValidQuery(PostListParams {
            skip: Some(1),
            limit: Some(2),
        }),
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 2);

    let Json(all) = handlers::list_posts(
        State(state.clone()),
        ValidQuery(PostListParams {
            skip: None,
            limit: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let err = handlers::list_posts(
        State(state),
        ValidQuery(PostListParams {
            skip: Some(-1),
            limit: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_update_post_by_author_is_partial() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "editor@example.com").await);
    let post = create_post(&state, &author, "Draft").await;

    let Json(updated) = handlers::update_post(
        author,
        State(state),
        ValidPath(post.id),
        ValidJson(UpdatePostRequest {
            title: Some("Final".to_string()),
            ..UpdatePostRequest::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(updated.title, "Final");
    assert_eq!(updated.content, post.content);
    assert_eq!(updated.published, post.published);
}

#[tokio::test]
async fn test_update_post_by_stranger_is_forbidden() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "owner@example.com").await);
    let stranger = as_caller(&register(&state, "stranger@example.com").await);
    let post = create_post(&state, &author, "Mine").await;

    let err = handlers::update_post(
        stranger,
        State(state.clone()),
        ValidPath(post.id),
        ValidJson(UpdatePostRequest {
            title: Some("Hijacked".to_string()),
            ..UpdatePostRequest::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let Json(unchanged) = handlers::get_post(State(state), ValidPath(post.id)).await.unwrap();
    assert_eq!(unchanged.title, "Mine");
}

#[tokio::test]
async fn test_update_missing_post_is_not_found_before_ownership() {
    let state = create_test_state();
    let caller = as_caller(&register(&state, "someone@example.com").await);

    let err = handlers::update_post(
        caller,
        State(state),
        ValidPath(Uuid::new_v4()),
        ValidJson(UpdatePostRequest::default()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_post_by_author_and_admin() {
    let state = create_test_state();
    let author = as_caller(&register(&state, "writer@example.com").await);
    let admin = seed_admin(&state).await;
    let first = create_post(&state, &author, "First").await;
    let second = create_post(&state, &author, "Second").await;

    let Json(msg) = handlers::delete_post(author.clone(), State(state.clone()), ValidPath(first.id))
        .await
        .unwrap();
    assert_eq!(msg.message, "Post deleted successfully");

    // Admins may moderate through the regular endpoint as well.
    handlers::delete_post(admin, State(state.clone()), ValidPath(second.id))
        .await
        .unwrap();

    let err = handlers::delete_post(author, State(state), ValidPath(first.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

// --- PROFILE ---

#[tokio::test]
async fn test_get_me_returns_caller() {
    let state = create_test_state();
    let user = register(&state, "me@example.com").await;

    let Json(me) = handlers::get_me(as_caller(&user), State(state)).await.unwrap();
    assert_eq!(me, user);
}

#[tokio::test]
async fn test_change_password_flow() {
    let state = create_test_state();
    let user = register(&state, "rotate@example.com").await;
    let caller = as_caller(&user);

    let err = handlers::change_password(
        caller.clone(),
        State(state.clone()),
        ValidJson(ChangePasswordRequest {
            old_password: "NotTheOld1".to_string(),
            new_password: "Brand3New".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Incorrect old password");

    let err = handlers::change_password(
        caller.clone(),
        State(state.clone()),
        ValidJson(ChangePasswordRequest {
            old_password: PASSWORD.to_string(),
            new_password: "weak".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    handlers::change_password(
        caller,
        State(state.clone()),
        ValidJson(ChangePasswordRequest {
            old_password: PASSWORD.to_string(),
            new_password: "Brand3New".to_string(),
        }),
    )
    .await
    .unwrap();

    let old = handlers::login(
        State(state.clone()),
        ValidJson(LoginRequest {
            email: "rotate@example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await;
    assert!(old.is_err());

    let new = handlers::login(
        State(state),
        ValidJson(LoginRequest {
            email: "rotate@example.com".to_string(),
            password: "Brand3New".to_string(),
        }),
    )
    .await;
    assert!(new.is_ok());
}

// --- ADMIN ---

#[tokio::test]
async fn test_seed_admin_is_idempotent() {
    let state = create_test_state();
    let first = seed_admin(&state).await;
    let second = seed_admin(&state).await;

    assert_eq!(first.id, second.id);
    assert_eq!(first.role, Role::Admin);
}

#[tokio::test]
async fn test_admin_delete_user_cascades_posts() {
    let state = create_test_state();
    let admin = seed_admin(&state).await;
    let victim = register(&state, "victim@example.com").await;
    let post = create_post(&state, &as_caller(&victim), "Gone soon").await;

    let Json(msg) = handlers::delete_user(
        AdminUser(admin.clone()),
        State(state.clone()),
        ValidPath(victim.id),
    )
    .await
    .unwrap();
    assert_eq!(msg.message, "User deleted successfully");

    let err = handlers::get_post(State(state.clone()), ValidPath(post.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let err = handlers::delete_user(AdminUser(admin), State(state), ValidPath(victim.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_status_and_listing() {
    let state = create_test_state();
    let admin = seed_admin(&state).await;
    let user = register(&state, "flip@example.com").await;
    create_post(&state, &as_caller(&user), "Visible to admin").await;

    let Json(updated) = handlers::update_user_status(
        AdminUser(admin.clone()),
        State(state.clone()),
        ValidPath(user.id),
        ValidJson(UpdateUserStatusRequest { is_active: false }),
    )
    .await
    .unwrap();
    assert!(!updated.is_active);

    let Json(users) = handlers::list_users(AdminUser(admin.clone()), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(users.len(), 2);

    let Json(posts) = handlers::list_all_posts(AdminUser(admin.clone()), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);

    handlers::delete_any_post(AdminUser(admin.clone()), State(state.clone()), ValidPath(posts[0].id))
        .await
        .unwrap();
    let err = handlers::delete_any_post(AdminUser(admin), State(state), ValidPath(posts[0].id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_with_unrepresentable_lifetime_fails_cleanly() {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let state = AppState::new(
        repo,
        AppConfig {
            access_token_expire_minutes: 200_000_000_000,
            ..AppConfig::default()
        },
    );
    register(&state, "forever@example.com").await;

    let err = handlers::login(
        State(state),
        ValidJson(LoginRequest {
            email: "forever@example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
