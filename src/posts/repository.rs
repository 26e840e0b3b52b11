// Repository pattern - all post/like persistence goes through here
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::Arc;

use crate::db::models::{self, format_timestamp, parse_timestamp, Like, User};
use crate::posts::domain::{Identity, PostError, PostText, PostView, Resource};
use crate::state::DbPool;

/// Post/like store. Every operation is a single transaction.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Get-or-create the user row for an identity (idempotent)
    async fn ensure_user(&self, identity: &Identity) -> Result<User, PostError>;

    /// All posts, newest first, with aggregates for `viewer`
    async fn list_posts(&self, viewer: &Identity) -> Result<Vec<PostView>, PostError>;

    /// Posts owned by `username`, newest first
    async fn list_posts_by_user(
        &self,
        viewer: &Identity,
        username: &str,
    ) -> Result<Vec<PostView>, PostError>;

    async fn get_post(&self, viewer: &Identity, post_id: &str) -> Result<PostView, PostError>;

    async fn create_post(&self, owner: &Identity, text: &str) -> Result<PostView, PostError>;

    /// Owner-only; removes the post's likes with it
    async fn delete_post(&self, requester: &Identity, post_id: &str) -> Result<(), PostError>;

    /// Rejects a second like for the same (user, post) with `Conflict`
    async fn like_post(&self, user: &Identity, post_id: &str) -> Result<Like, PostError>;

    async fn unlike_post(&self, user: &Identity, post_id: &str) -> Result<(), PostError>;
}

/// SQLite implementation
pub struct SqlitePostStore {
    pool: DbPool,
    max_length: usize,
}

impl SqlitePostStore {
    pub fn new(pool: DbPool, max_length: usize) -> Self {
        Self { pool, max_length }
    }

    /// Run blocking SQLite work off the async executor.
    async fn run<T, F>(&self, f: F) -> Result<T, PostError>
    where
        F: FnOnce(&mut Connection) -> Result<T, PostError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }
}

const POST_VIEW_SELECT: &str = "SELECT p.id, p.body, p.created_at, p.user_id, u.username,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
        EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1) AS liked_by_me
     FROM posts p
     JOIN users u ON u.id = p.user_id";

const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.id DESC";

struct PostRow {
    id: String,
    body: String,
    created_at: String,
    owner_id: String,
    owner_username: String,
    likes: i64,
    liked_by_me: bool,
}

impl PostRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            body: row.get(1)?,
            created_at: row.get(2)?,
            owner_id: row.get(3)?,
            owner_username: row.get(4)?,
            likes: row.get(5)?,
            liked_by_me: row.get(6)?,
        })
    }

    fn into_view(self) -> Result<PostView, PostError> {
        Ok(PostView {
            timestamp: parse_timestamp(&self.created_at)?,
            id: self.id,
            text: self.body,
            owner_id: self.owner_id,
            owner_username: self.owner_username,
            likes: self.likes,
            liked_by_me: self.liked_by_me,
        })
    }
}

fn query_views(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PostView>, PostError> {
    let mut stmt = conn.prepare(sql)?;
    let views = stmt
        .query_map(params, PostRow::from_row)?
        .map(|row| row.map_err(PostError::from).and_then(PostRow::into_view))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(views)
}

fn query_view(conn: &Connection, viewer_id: &str, post_id: &str) -> Result<PostView, PostError> {
    let sql = format!("{} WHERE p.id = ?2", POST_VIEW_SELECT);
    conn.query_row(&sql, params![viewer_id, post_id], PostRow::from_row)
        .optional()?
        .ok_or(PostError::NotFound(Resource::Post))?
        .into_view()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn ensure_user_in(conn: &Connection, identity: &Identity) -> Result<User, PostError> {
    let existing = conn
        .query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?1",
            params![identity.user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    if let Some((id, username, created_at)) = existing {
        if username != identity.username {
            // Account was renamed since this user last wrote anything
            conn.execute(
                "UPDATE users SET username = ?2 WHERE id = ?1",
                params![id, identity.username],
            )
            .map_err(|e| username_conflict(e, identity))?;
            tracing::info!(user_id = %id, from = %username, to = %identity.username, "Renamed user");
        }
        return Ok(User {
            id,
            username: identity.username.clone(),
            created_at: parse_timestamp(&created_at)?,
        });
    }

    let now = models::now();
    conn.execute(
        "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
        params![identity.user_id, identity.username, format_timestamp(&now)],
    )
    .map_err(|e| username_conflict(e, identity))?;
    tracing::info!(user_id = %identity.user_id, username = %identity.username, "Registered user");
    Ok(User {
        id: identity.user_id.clone(),
        username: identity.username.clone(),
        created_at: now,
    })
}

fn username_conflict(err: rusqlite::Error, identity: &Identity) -> PostError {
    if is_unique_violation(&err) {
        PostError::Conflict(format!(
            "Username '{}' is already taken",
            identity.username
        ))
    } else {
        err.into()
    }
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn ensure_user(&self, identity: &Identity) -> Result<User, PostError> {
        let identity = identity.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let user = ensure_user_in(&tx, &identity)?;
            tx.commit()?;
            Ok(user)
        })
        .await
    }

    async fn list_posts(&self, viewer: &Identity) -> Result<Vec<PostView>, PostError> {
        let viewer_id = viewer.user_id.clone();
        self.run(move |conn| {
            let sql = format!("{} {}", POST_VIEW_SELECT, NEWEST_FIRST);
            query_views(conn, &sql, params![viewer_id])
        })
        .await
    }

    async fn list_posts_by_user(
        &self,
        viewer: &Identity,
        username: &str,
    ) -> Result<Vec<PostView>, PostError> {
        let viewer_id = viewer.user_id.clone();
        let username = username.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let owner_id: String = tx
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(PostError::NotFound(Resource::User))?;

            let sql = format!("{} WHERE p.user_id = ?2 {}", POST_VIEW_SELECT, NEWEST_FIRST);
            let posts = query_views(&tx, &sql, params![viewer_id, owner_id])?;
            tx.commit()?;
            Ok(posts)
        })
        .await
    }

    async fn get_post(&self, viewer: &Identity, post_id: &str) -> Result<PostView, PostError> {
        let viewer_id = viewer.user_id.clone();
        let post_id = post_id.to_string();
        self.run(move |conn| query_view(conn, &viewer_id, &post_id))
            .await
    }

    async fn create_post(&self, owner: &Identity, text: &str) -> Result<PostView, PostError> {
        let text = PostText::parse(text, self.max_length)?;
        let owner = owner.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let user = ensure_user_in(&tx, &owner)?;

            let post_id = uuid::Uuid::now_v7().to_string();
            let now = models::now();
            tx.execute(
                "INSERT INTO posts (id, user_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![post_id, user.id, text.as_str(), format_timestamp(&now)],
            )?;
            let view = query_view(&tx, &user.id, &post_id)?;
            tx.commit()?;

            tracing::info!(post_id = %view.id, user_id = %user.id, "Post created");
            Ok(view)
        })
        .await
    }

    async fn delete_post(&self, requester: &Identity, post_id: &str) -> Result<(), PostError> {
        let requester_id = requester.user_id.clone();
        let post_id = post_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let owner_id: String = tx
                .query_row(
                    "SELECT user_id FROM posts WHERE id = ?1",
                    params![post_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(PostError::NotFound(Resource::Post))?;

            if owner_id != requester_id {
                tracing::warn!(post_id = %post_id, user_id = %requester_id, "Rejected delete by non-owner");
                return Err(PostError::Forbidden);
            }

            // Likes go with it via ON DELETE CASCADE
            tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            tx.commit()?;

            tracing::info!(post_id = %post_id, user_id = %requester_id, "Post deleted");
            Ok(())
        })
        .await
    }

    async fn like_post(&self, user: &Identity, post_id: &str) -> Result<Like, PostError> {
        let user = user.clone();
        let post_id = post_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM posts WHERE id = ?1",
                    params![post_id],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(PostError::NotFound(Resource::Post));
            }

            // likes.user_id references users, so a first-time liker is registered too.
            // A username collision here surfaces as "Username '..' is already taken",
            // not "Already liked".
            ensure_user_in(&tx, &user)?;

            let like = Like {
                id: uuid::Uuid::now_v7().to_string(),
                user_id: user.user_id.clone(),
                post_id: post_id.clone(),
                created_at: models::now(),
            };
            // The UNIQUE(user_id, post_id) constraint decides races
            match tx.execute(
                "INSERT INTO likes (id, user_id, post_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    like.id,
                    like.user_id,
                    like.post_id,
                    format_timestamp(&like.created_at)
                ],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(PostError::Conflict("Already liked".into()))
                }
                Err(e) => return Err(e.into()),
            }
            tx.commit()?;

            tracing::info!(post_id = %like.post_id, user_id = %like.user_id, "Post liked");
            Ok(like)
        })
        .await
    }

    async fn unlike_post(&self, user: &Identity, post_id: &str) -> Result<(), PostError> {
        let user_id = user.user_id.clone();
        let post_id = post_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            if removed == 0 {
                return Err(PostError::NotFound(Resource::Like));
            }
            tx.commit()?;

            tracing::info!(post_id = %post_id, user_id = %user_id, "Post unliked");
            Ok(())
        })
        .await
    }
}

/// Type alias for Arc-wrapped store (for AppState)
pub type DynPostStore = Arc<dyn PostStore>;
