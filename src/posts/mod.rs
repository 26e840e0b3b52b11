pub mod domain;
pub mod repository;

pub use domain::{Identity, PostError, PostText, PostView, Resource};
pub use repository::{DynPostStore, PostStore, SqlitePostStore};
