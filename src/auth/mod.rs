pub mod accounts;
pub mod resolver;
pub mod session;

use thiserror::Error;

pub use resolver::{DynIdentityResolver, IdentityResolver, Login, SessionAuth};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Auth task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
