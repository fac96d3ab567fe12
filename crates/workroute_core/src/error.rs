//! Error taxonomy surfaced by services and query builders.
//!
//! # Invariants
//! - `NotAuthorized` stays distinct from the not-found variants so callers can
//!   tell "does not exist" from "exists but forbidden".
//! - Nothing in the core retries; every error reaches the caller.

use crate::db::DbError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug)]
pub enum CoreError {
    /// Missing or malformed caller input.
    InvalidArgument(String),
    ClassificationNotFound { key: String, domain: String },
    WorkbasketNotFound(String),
    TaskNotFound(String),
    ClassificationAlreadyExists { key: String, domain: String },
    WorkbasketAlreadyExists(String),
    NotAuthorized {
        access_ids: Vec<String>,
        workbasket_key: String,
        permission: String,
    },
    /// `single()` matched more than one row.
    AmbiguousResult(u64),
    Repo(RepoError),
}

impl CoreError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether this is one of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClassificationNotFound { .. }
                | Self::WorkbasketNotFound(_)
                | Self::TaskNotFound(_)
        )
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::ClassificationNotFound { key, domain } => write!(
                f,
                "classification not found: key `{key}` in domain `{domain}`"
            ),
            Self::WorkbasketNotFound(id) => write!(f, "workbasket not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ClassificationAlreadyExists { key, domain } => write!(
                f,
                "classification already exists: key `{key}` in domain `{domain}`"
            ),
            Self::WorkbasketAlreadyExists(key) => {
                write!(f, "workbasket already exists: key `{key}`")
            }
            Self::NotAuthorized {
                access_ids,
                workbasket_key,
                permission,
            } => write!(
                f,
                "access ids [{}] lack {permission} permission on workbasket `{workbasket_key}`",
                access_ids.join(", ")
            ),
            Self::AmbiguousResult(count) => {
                write!(f, "expected at most one result, found {count}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
