//! Error taxonomy for sequence operations.

use crate::model::issue::IssueId;
use crate::repo::issue_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SequenceResult<T> = Result<T, SequenceError>;

/// Failures surfaced by `assign`, `compact` and their callers.
#[derive(Debug)]
pub enum SequenceError {
    /// Store unreachable or a write failed; callers may retry.
    StorageUnavailable(RepoError),
    /// The sequence lock was not acquired within the busy timeout.
    Timeout,
    /// Target issue does not exist.
    RecordNotFound(IssueId),
    /// Numbers are duplicated or gapped after an operation that must keep
    /// them distinct and gapless.
    InvariantViolation(String),
    /// No number above the current maximum is representable.
    Exhausted,
}

impl Display for SequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable(err) => write!(f, "number storage unavailable: {err}"),
            Self::Timeout => write!(f, "timed out waiting for the number sequence lock"),
            Self::RecordNotFound(id) => write!(f, "issue not found: {id}"),
            Self::InvariantViolation(details) => {
                write!(f, "number sequence invariant violated: {details}")
            }
            Self::Exhausted => write!(f, "number sequence exhausted"),
        }
    }
}

impl Error for SequenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SequenceError {
    fn from(value: RepoError) -> Self {
        if value.is_busy() {
            return Self::Timeout;
        }
        match value {
            RepoError::NotFound(id) => Self::RecordNotFound(id),
            RepoError::DuplicateNumber(number) => Self::InvariantViolation(format!(
                "number {number} would be held by two live issues"
            )),
            other => Self::StorageUnavailable(other),
        }
    }
}

impl SequenceError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Timeout => "timeout",
            Self::RecordNotFound(_) => "record_not_found",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Exhausted => "exhausted",
        }
    }
}
