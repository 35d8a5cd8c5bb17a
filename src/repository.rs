use crate::{
    error::RepositoryError,
    models::{CreatePostRequest, NewUser, Post, UpdatePostRequest, User},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. Handlers and extractors
/// only see `Arc<dyn Repository>`, so Postgres and the in-memory store are interchangeable.
///
/// The repository performs no authorization; callers consult `policy` first.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Fails with `RepositoryError::Conflict` if the email is already taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    // Returns false if the user does not exist.
    async fn update_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool>;
    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>>;
    /// Deletes the user and every post it authored. Returns false if the user does not exist.
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;

    // --- Posts ---
    // Ordered by creation time, newest first.
    async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>>;
    async fn list_all_posts(&self) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>>;
    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> RepoResult<Post>;
    // Absent fields keep their value. Returns None if the post does not exist.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, password_hash, is_active, role, created_at";
const POST_COLUMNS: &str = "id, title, content, published, created_at, author_id";

fn map_unique_violation(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::Database(e),
    }
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let query = format!(
            "INSERT INTO users (id, email, password_hash, is_active, role, created_at) \
             VALUES ($1, $2, $3, true, $4, NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let query =
            format!("UPDATE users SET is_active = $1 WHERE id = $2 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(is_active)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// delete_user
    ///
    /// Explicit cascade inside one transaction: the author's posts go first, then the user.
    /// The `ON DELETE CASCADE` foreign key covers any row inserted by other writers.
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let posts = sqlx::query("DELETE FROM posts WHERE author_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let users = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %id,
            posts_removed = posts.rows_affected(),
            "user delete cascaded"
        );
        Ok(users.rows_affected() > 0)
    }

    async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id OFFSET $1 LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_all_posts(&self) -> RepoResult<Vec<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id");
        Ok(sqlx::query_as::<_, Post>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> RepoResult<Post> {
        let query = format!(
            "INSERT INTO posts (id, title, content, published, created_at, author_id) \
             VALUES ($1, $2, $3, $4, NOW(), $5) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(Uuid::new_v4())
            .bind(req.title)
            .bind(req.content)
            .bind(req.published)
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_post
    ///
    /// Uses `COALESCE` so only the fields present in `req` are written.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let query = format!(
            "UPDATE posts SET title = COALESCE($2, title), \
                              content = COALESCE($3, content), \
                              published = COALESCE($4, published) \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.published)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, Post>,
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. Enforces the same rules as the Postgres
/// schema (unique email, cascading user delete) so it can stand in for it in tests.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict);
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash;
                true
            }
            None => false,
        })
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.posts.retain(|_, post| post.author_id != id);
        Ok(true)
    }

    async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
        let posts = self.list_all_posts().await?;
        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_all_posts(&self) -> RepoResult<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables.posts.values().cloned().collect();
        newest_first(&mut posts);
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> RepoResult<Post> {
        let mut tables = self.tables.write().await;
        // Mirrors the posts.author_id foreign key.
        if !tables.users.contains_key(&author_id) {
            return Err(RepositoryError::Database(sqlx::Error::RowNotFound));
        }

        let post = Post {
            id: Uuid::new_v4(),
            title: req.title,
            content: req.content,
            published: req.published,
            created_at: Utc::now(),
            author_id,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> RepoResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        Ok(tables.posts.get_mut(&id).map(|post| {
            if let Some(title) = req.title {
                post.title = title;
            }
            if let Some(content) = req.content {
                post.content = content;
            }
            if let Some(published) = req.published {
                post.published = published;
            }
            post.clone()
        }))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.tables.write().await.posts.remove(&id).is_some())
    }
}
