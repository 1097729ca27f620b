//! Persistence contracts and SQLite reference adapters.
//!
//! # Responsibility
//! - Define the async operations core consumes from the persistence service.
//! - Provide SQLite adapters that stand in for that service in tests and
//!   embedded deployments.
//!
//! # Invariants
//! - Write paths validate input before any SQL mutation.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Services depend on the traits only, never on the SQLite adapters.

use crate::db::{DbError, SharedConnection};
use crate::model::comment::CommentValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{MutexGuard, PoisonError};

pub mod comment_repo;
pub mod identity_repo;
pub mod notification_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error reported by any persistence contract.
#[derive(Debug)]
pub enum RepoError {
    Validation(CommentValidationError),
    Db(DbError),
    NotFound(String),
    InvalidData(String),
    /// Transport-level failure of a remote persistence service.
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Unavailable(message) => write!(f, "persistence service unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<CommentValidationError> for RepoError {
    fn from(value: CommentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Locks the shared connection; a poisoned lock is recovered, since every
/// statement runs in its own implicit transaction.
pub(crate) fn lock_connection(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
