use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::Arc;

use crate::auth::{accounts, session, AuthError};
use crate::posts::Identity;
use crate::state::DbPool;

/// Turns a bearer credential into the caller's identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError>;
}

pub type DynIdentityResolver = Arc<dyn IdentityResolver>;

/// Successful login: the new bearer token and who it belongs to.
#[derive(Debug, Clone)]
pub struct Login {
    pub token: String,
    pub identity: Identity,
}

/// Session-backed auth over the `accounts` and `sessions` tables.
#[derive(Clone)]
pub struct SessionAuth {
    pool: DbPool,
    session_hours: u64,
}

impl SessionAuth {
    pub fn new(pool: DbPool, session_hours: u64) -> Self {
        Self {
            pool,
            session_hours,
        }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, AuthError>
    where
        F: FnOnce(&Connection) -> Result<T, AuthError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&*conn)
        })
        .await?
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Login, AuthError> {
        let username = username.to_string();
        let password = password.to_string();
        let hours = self.session_hours;
        self.run(move |conn| {
            let identity = accounts::verify_password(conn, &username, &password)?;
            session::purge_expired(conn)?;
            let token = session::create_session(conn, &identity.user_id, hours)?;
            tracing::info!(user_id = %identity.user_id, "Session created");
            Ok(Login { token, identity })
        })
        .await
    }

    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        self.run(|conn| Ok(session::purge_expired(conn)?)).await
    }

    pub async fn logout(&self, token: &str) -> Result<bool, AuthError> {
        let token = token.to_string();
        self.run(move |conn| Ok(session::delete_session(conn, &token)?))
            .await
    }
}

#[async_trait]
impl IdentityResolver for SessionAuth {
    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        let token = credential.to_string();
        self.run(move |conn| {
            session::find_session(conn, &token)?.ok_or(AuthError::InvalidCredentials)
        })
        .await
    }
}
