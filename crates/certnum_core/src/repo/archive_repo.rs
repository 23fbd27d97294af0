//! Issuance archive: a write-once ledger of numbered issues.
//!
//! # Responsibility
//! - Snapshot an issue together with the number it was issued under.
//! - Keep the snapshot when the live issue is later deleted or renumbered.
//!
//! # Invariants
//! - At most one archive row per issue id; repeated archiving is a no-op.
//! - Only numbered issues can be archived.

use crate::model::issue::{Issue, IssueId, IssueNumber};
use crate::repo::issue_repo::{number_from_db, RepoError, RepoResult};
use crate::repo::schema::ensure_connection_ready;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const ARCHIVE_SELECT_SQL: &str = "SELECT
    issue_uuid,
    template_id,
    user_id,
    code,
    certificate_number,
    issued_at,
    expires_at,
    archived_at
FROM certificate_number_archive";

const ARCHIVE_COLUMNS: &[&str] = &[
    "issue_uuid",
    "template_id",
    "user_id",
    "code",
    "certificate_number",
    "issued_at",
    "expires_at",
    "archived_at",
];

/// Snapshot of one issue at the time it was archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedIssue {
    pub issue_id: IssueId,
    pub template_id: String,
    pub user_id: String,
    pub code: String,
    /// Number held when archived; live numbering may have moved since.
    pub number: IssueNumber,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
    pub archived_at: i64,
}

/// Result of an archive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Inserted,
    AlreadyArchived,
}

pub trait ArchiveRepository {
    fn archive_issue(&self, issue: &Issue) -> RepoResult<ArchiveOutcome>;
    fn get_archived(&self, id: IssueId) -> RepoResult<Option<ArchivedIssue>>;
    /// Lists snapshots in archive order.
    fn list_archived(&self) -> RepoResult<Vec<ArchivedIssue>>;
}

/// SQLite-backed archive repository.
#[derive(Clone, Copy)]
pub struct SqliteArchiveRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteArchiveRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "certificate_number_archive", ARCHIVE_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl ArchiveRepository for SqliteArchiveRepository<'_> {
    fn archive_issue(&self, issue: &Issue) -> RepoResult<ArchiveOutcome> {
        issue.validate()?;
        let number = issue.number.ok_or(RepoError::NotNumbered(issue.id))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO certificate_number_archive (
                issue_uuid,
                template_id,
                user_id,
                code,
                certificate_number,
                issued_at,
                expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                issue.id.to_string(),
                issue.template_id.as_str(),
                issue.user_id.as_str(),
                issue.code.as_str(),
                i64::from(number),
                issue.issued_at,
                issue.expires_at,
            ],
        )?;

        Ok(if inserted == 0 {
            ArchiveOutcome::AlreadyArchived
        } else {
            ArchiveOutcome::Inserted
        })
    }

    fn get_archived(&self, id: IssueId) -> RepoResult<Option<ArchivedIssue>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ARCHIVE_SELECT_SQL} WHERE issue_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_archive_row(row)?));
        }
        Ok(None)
    }

    fn list_archived(&self) -> RepoResult<Vec<ArchivedIssue>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ARCHIVE_SELECT_SQL} ORDER BY archived_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_archive_row(row)?);
        }
        Ok(items)
    }
}

fn parse_archive_row(row: &Row<'_>) -> RepoResult<ArchivedIssue> {
    let id_text: String = row.get("issue_uuid")?;
    let issue_id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{id_text}` in certificate_number_archive.issue_uuid"
        ))
    })?;

    Ok(ArchivedIssue {
        issue_id,
        template_id: row.get("template_id")?,
        user_id: row.get("user_id")?,
        code: row.get("code")?,
        number: number_from_db(
            row.get("certificate_number")?,
            "certificate_number_archive.certificate_number",
        )?,
        issued_at: row.get("issued_at")?,
        expires_at: row.get("expires_at")?,
        archived_at: row.get("archived_at")?,
    })
}
