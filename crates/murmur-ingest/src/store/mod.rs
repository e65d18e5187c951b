//! Persistence for users and posts.
//!
//! The pipeline only needs two operations per entity kind: look a row up by
//! id, and insert a new row. Inserts never overwrite; inserting an id that
//! is already present fails with [`StoreError::DuplicateKey`], which callers
//! treat as "already ingested".
//!
//! - [`PersistenceStore`] - the seam the pipeline is written against
//! - [`SqliteStore`] - SQLite-backed implementation used by the daemon

mod schema;
mod sqlite;

pub use schema::{SCHEMA_VERSION, init_schema};
pub use sqlite::SqliteStore;

use murmur_core::{Post, User};
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The two persisted entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Post,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a [`PersistenceStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// A row with this id already exists. Expected under races; benign.
    #[error("duplicate key: {kind} {id}")]
    DuplicateKey { kind: EntityKind, id: String },

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking worker running the query failed.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Key-based lookup and insert for users and posts.
///
/// Calls may suspend the calling task but never block the executor.
pub trait PersistenceStore: Send + Sync + 'static {
    /// Look up a user by id.
    fn get_user(&self, id: &str) -> impl Future<Output = StoreResult<Option<User>>> + Send;

    /// Insert a user. Fails with [`StoreError::DuplicateKey`] if the id exists.
    fn put_user(&self, user: &User) -> impl Future<Output = StoreResult<()>> + Send;

    /// Look up a post by id.
    fn get_post(&self, id: &str) -> impl Future<Output = StoreResult<Option<Post>>> + Send;

    /// Insert a post. Fails with [`StoreError::DuplicateKey`] if the id exists.
    fn put_post(&self, post: &Post) -> impl Future<Output = StoreResult<()>> + Send;
}
