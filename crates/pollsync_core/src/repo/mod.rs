//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for references and the
//!   update ledger.
//! - Isolate SQLite query details from scheduling and fan-out logic.
//!
//! # Invariants
//! - Ledger counters are only mutated through statements keyed by row id;
//!   no API writes back a cached record.
//! - A unique-constraint violation on window creation is reported as
//!   `RepoError::WindowAlreadyClaimed`, never as a generic database error.

use crate::db::DbError;
use crate::model::poll::PollId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod reference_repo;
pub mod update_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for reference and ledger operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Target row does not exist.
    NotFound { table: &'static str, id: i64 },
    /// Another worker created the `(poll, window)` record first.
    WindowAlreadyClaimed { poll_id: PollId, window_start_ms: i64 },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { table, id } => write!(f, "{table} row not found: {id}"),
            Self::WindowAlreadyClaimed {
                poll_id,
                window_start_ms,
            } => write!(
                f,
                "update window {window_start_ms} of poll {poll_id} already exists"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
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

fn parse_poll_uuid(value: &str, column: &str) -> RepoResult<PollId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
