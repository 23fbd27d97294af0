//! Certificate number sequence core.
//!
//! Allocates gapless, human-presentable numbers to issued certificates,
//! keeps them compact after deletions, and selects what the number element
//! displays. This crate is the single source of truth for the numbering
//! invariants.

pub mod db;
pub mod display;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sequence;
pub mod service;

pub use display::config::{DisplayConfig, DisplayMode, DISPLAY_CERTIFICATE_NUMBER};
pub use display::selector::{DisplayError, DisplaySelector, DisplayValue, Renderer, TextRenderer};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::issue::{Issue, IssueId, IssueNumber, IssueValidationError};
pub use repo::archive_repo::{
    ArchiveOutcome, ArchiveRepository, ArchivedIssue, SqliteArchiveRepository,
};
pub use repo::issue_repo::{
    IssueListQuery, IssueRepository, NumberStore, NumberSummary, RepoError, RepoResult,
    ScopedNumberStore, SqliteIssueRepository,
};
pub use sequence::allocator::{Allocator, Assignment};
pub use sequence::compactor::{CompactionReport, Compactor};
pub use sequence::error::{SequenceError, SequenceResult};
pub use sequence::generator::next_number;
pub use sequence::SequenceScope;
pub use service::issue_service::{IssueService, IssueServiceError, IssuedCertificate};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
