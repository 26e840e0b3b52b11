use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

use crate::auth::{DynIdentityResolver, SessionAuth};
use crate::config::Config;
use crate::posts::{DynPostStore, SqlitePostStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub posts: DynPostStore,
    pub identity: DynIdentityResolver,
    pub sessions: SessionAuth,
}

impl AppState {
    /// Wire the SQLite-backed store and session auth onto one pool.
    pub fn new(config: Config, pool: DbPool) -> Self {
        let sessions = SessionAuth::new(pool.clone(), config.auth.session_hours);
        Self {
            posts: Arc::new(SqlitePostStore::new(pool, config.posts.max_length)),
            identity: Arc::new(sessions.clone()),
            sessions,
            config,
        }
    }
}
