//! Certificate issuance use-case service.
//!
//! # Responsibility
//! - Issue certificates: create, number, archive.
//! - Delete certificates and compact the remaining numbering.
//! - Resolve the display value of an issue for a given configuration.
//!
//! # Invariants
//! - Numbers are only touched through `Allocator` and `Compactor`.
//! - A deletion is always followed by a compaction attempt; if compaction
//!   fails the error is returned and a later `compact` call repairs gaps.

use crate::display::config::DisplayConfig;
use crate::display::selector::{DisplaySelector, DisplayValue};
use crate::model::issue::{Issue, IssueId};
use crate::repo::archive_repo::{ArchiveOutcome, ArchiveRepository, ArchivedIssue};
use crate::repo::issue_repo::{IssueListQuery, IssueRepository, RepoError, ScopedNumberStore};
use crate::sequence::allocator::Allocator;
use crate::sequence::compactor::{CompactionReport, Compactor};
use crate::sequence::error::SequenceError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Service error for issuance use-cases.
#[derive(Debug)]
pub enum IssueServiceError {
    /// Target issue does not exist.
    IssueNotFound(IssueId),
    /// Numbering failure.
    Sequence(SequenceError),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for IssueServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IssueNotFound(id) => write!(f, "issue not found: {id}"),
            Self::Sequence(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent issue state: {details}"),
        }
    }
}

impl Error for IssueServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sequence(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for IssueServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::IssueNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<SequenceError> for IssueServiceError {
    fn from(value: SequenceError) -> Self {
        match value {
            SequenceError::RecordNotFound(id) => Self::IssueNotFound(id),
            other => Self::Sequence(other),
        }
    }
}

/// Issued certificate with its archive outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub issue: Issue,
    pub archive: ArchiveOutcome,
}

/// Issuance service facade over repository implementations.
pub struct IssueService<R, A> {
    repo: R,
    archive: A,
}

impl<R, A> IssueService<R, A>
where
    R: IssueRepository + ScopedNumberStore,
    A: ArchiveRepository,
{
    pub fn new(repo: R, archive: A) -> Self {
        Self { repo, archive }
    }

    /// Issues one certificate and numbers it immediately.
    ///
    /// When numbering fails the issue stays stored unnumbered and is
    /// numbered lazily on first render.
    pub fn issue(
        &self,
        template_id: impl Into<String>,
        user_id: impl Into<String>,
        expires_at: Option<i64>,
    ) -> Result<IssuedCertificate, IssueServiceError> {
        let started_at = Instant::now();
        let mut issue = Issue::new(template_id, user_id);
        issue.expires_at = expires_at;
        let id = self.repo.create_issue(&issue)?;
        info!(
            "event=issue_create module=service status=ok issue_id={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );

        Allocator::new(&self.repo).assign(id)?;

        let issued = self
            .repo
            .get_issue(id)?
            .ok_or(IssueServiceError::InconsistentState(
                "issued certificate missing after numbering",
            ))?;
        if !issued.is_numbered() {
            return Err(IssueServiceError::InconsistentState(
                "issued certificate unnumbered after assignment",
            ));
        }

        let archive = self.archive.archive_issue(&issued)?;
        info!(
            "event=issue_archive module=service status=ok issue_id={} outcome={:?}",
            id, archive
        );

        Ok(IssuedCertificate {
            issue: issued,
            archive,
        })
    }

    pub fn get_issue(&self, id: IssueId) -> Result<Issue, IssueServiceError> {
        self.repo
            .get_issue(id)?
            .ok_or(IssueServiceError::IssueNotFound(id))
    }

    pub fn list_issues(&self, query: &IssueListQuery) -> Result<Vec<Issue>, IssueServiceError> {
        Ok(self.repo.list_issues(query)?)
    }

    /// Deletes one issue and compacts the remaining numbers.
    ///
    /// Delete and compaction commit separately. If the process stops between
    /// them, the deleted number stays a gap until the next [`Self::compact`]
    /// call, which is the recovery step.
    pub fn delete_issue(&self, id: IssueId) -> Result<CompactionReport, IssueServiceError> {
        let started_at = Instant::now();
        if let Err(err) = self.repo.delete_issue(id) {
            error!(
                "event=issue_delete module=service status=error issue_id={} error={}",
                id, err
            );
            return Err(err.into());
        }
        info!(
            "event=issue_delete module=service status=ok issue_id={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );

        self.compact()
    }

    /// Compacts numbering; safe to call at any time.
    pub fn compact(&self) -> Result<CompactionReport, IssueServiceError> {
        Ok(Compactor::new(&self.repo).compact()?)
    }

    /// Resolves the value the number element shows for `id`.
    pub fn display(
        &self,
        id: IssueId,
        config: &DisplayConfig,
    ) -> Result<DisplayValue, IssueServiceError> {
        let issue = self.get_issue(id)?;
        Ok(DisplaySelector::new(&self.repo).format(&issue, config)?)
    }

    pub fn archived(&self, id: IssueId) -> Result<Option<ArchivedIssue>, IssueServiceError> {
        Ok(self.archive.get_archived(id)?)
    }
}
