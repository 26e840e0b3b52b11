// Domain types for the post/like store
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A resolved caller: who is asking, as reported by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Validated post body: trimmed, non-empty, bounded in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostText(String);

impl PostText {
    pub fn parse(raw: &str, max_length: usize) -> Result<Self, PostError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(PostError::Validation("Post text cannot be empty".into()));
        }
        if text.chars().count() > max_length {
            return Err(PostError::Validation(format!(
                "Post text must be {} characters or less",
                max_length
            )));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A post plus the aggregates derived for one viewer at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub owner_id: String,
    pub owner_username: String,
    pub likes: i64,
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Post,
    User,
    Like,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Post => write!(f, "Post"),
            Resource::User => write!(f, "User"),
            Resource::Like => write!(f, "Like"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("{0} not found")]
    NotFound(Resource),

    #[error("Not authorized to delete this post")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
