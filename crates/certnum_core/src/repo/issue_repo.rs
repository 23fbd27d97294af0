//! Issue repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over `certificate_issues` storage.
//! - Provide the number store contract (`NumberStore`) and its locked
//!   transactional scope (`ScopedNumberStore`) used by the allocator.
//!
//! # Invariants
//! - Write paths must call `Issue::validate()` before SQL mutations.
//! - Live numbers are distinct; the unique index backs this up and a
//!   violation surfaces as `RepoError::DuplicateNumber`.
//! - `in_sequence_scope` holds the database write lock for its whole body
//!   and commits only when the body succeeds.

use crate::db::DbError;
use crate::model::issue::{Issue, IssueId, IssueNumber, IssueValidationError};
use crate::repo::schema::ensure_connection_ready;
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ISSUE_SELECT_SQL: &str = "SELECT
    issue_uuid,
    template_id,
    user_id,
    code,
    certificate_number,
    issued_at,
    expires_at
FROM certificate_issues";

// Numbered rows first by number, then unnumbered rows in issuance order.
const NUMBER_ORDER_SQL: &str = "ORDER BY
    certificate_number IS NULL ASC,
    certificate_number ASC,
    issued_at ASC,
    issue_uuid ASC";

const ISSUE_COLUMNS: &[&str] = &[
    "issue_uuid",
    "template_id",
    "user_id",
    "code",
    "certificate_number",
    "issued_at",
    "expires_at",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for issue persistence and number store operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(IssueValidationError),
    Db(DbError),
    NotFound(IssueId),
    /// Another live issue already holds this number.
    DuplicateNumber(IssueNumber),
    /// Operation requires a numbered issue.
    NotNumbered(IssueId),
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether the failure was lock contention on the database.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "issue not found: {id}"),
            Self::DuplicateNumber(number) => {
                write!(f, "certificate number {number} is already held by another issue")
            }
            Self::NotNumbered(id) => write!(f, "issue has no certificate number: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted issue data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "issue repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "issue repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "issue repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IssueValidationError> for RepoError {
    fn from(value: IssueValidationError) -> Self {
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

/// Query options for listing issues.
#[derive(Debug, Clone, Default)]
pub struct IssueListQuery {
    pub template_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Aggregate view of the assigned numbers, used to verify compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberSummary {
    /// Count of live issues.
    pub live: u64,
    /// Count of live issues holding a positive number.
    pub numbered: u64,
    pub min: Option<IssueNumber>,
    pub max: Option<IssueNumber>,
}

impl NumberSummary {
    /// Returns whether the live numbers are exactly `1..=live`.
    ///
    /// Relies on numbers being distinct, which the unique index guarantees.
    pub fn is_gapless(&self) -> bool {
        if self.live == 0 {
            return self.numbered == 0;
        }
        self.numbered == self.live
            && self.min == Some(1)
            && self.max.map(u64::from) == Some(self.live)
    }
}

/// Record CRUD used by issuance flows.
pub trait IssueRepository {
    fn create_issue(&self, issue: &Issue) -> RepoResult<IssueId>;
    fn get_issue(&self, id: IssueId) -> RepoResult<Option<Issue>>;
    fn list_issues(&self, query: &IssueListQuery) -> RepoResult<Vec<Issue>>;
    /// Hard-deletes one issue together with its number.
    fn delete_issue(&self, id: IssueId) -> RepoResult<()>;
}

/// Number store operations consumed by the allocator and compactor.
///
/// Object safe so a transactional scope can hand out `&dyn NumberStore`.
pub trait NumberStore {
    /// Highest assigned number among live issues, or `0` when none.
    fn max_number(&self) -> RepoResult<IssueNumber>;
    fn number_exists(&self, number: IssueNumber) -> RepoResult<bool>;
    fn set_number(&self, id: IssueId, number: IssueNumber) -> RepoResult<()>;
    /// All live issues, numbered ones ascending, unnumbered ones last.
    fn list_by_number_ascending(&self) -> RepoResult<Vec<Issue>>;
    fn issue_by_id(&self, id: IssueId) -> RepoResult<Option<Issue>>;
    /// Moves every assigned number into a disjoint temporary range.
    ///
    /// Only meaningful inside a scope that reassigns all numbers afterwards.
    fn park_numbers(&self) -> RepoResult<usize>;
    fn number_summary(&self) -> RepoResult<NumberSummary>;
}

/// Number store with a scoped, exclusive transaction over the sequence.
pub trait ScopedNumberStore: NumberStore {
    /// Runs `f` while holding the sequence write lock.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Blocks while a
    /// competing scope holds the lock, up to the connection busy timeout.
    fn in_sequence_scope<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn NumberStore) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed issue repository.
#[derive(Clone, Copy)]
pub struct SqliteIssueRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIssueRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "certificate_issues", ISSUE_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl IssueRepository for SqliteIssueRepository<'_> {
    fn create_issue(&self, issue: &Issue) -> RepoResult<IssueId> {
        issue.validate()?;

        self.conn
            .execute(
                "INSERT INTO certificate_issues (
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
                    issue.number.map(i64::from),
                    issue.issued_at,
                    issue.expires_at,
                ],
            )
            .map_err(|err| match issue.number {
                Some(number) => map_number_write_error(err, number),
                None => err.into(),
            })?;

        Ok(issue.id)
    }

    fn get_issue(&self, id: IssueId) -> RepoResult<Option<Issue>> {
        load_issue(self.conn, id)
    }

    fn list_issues(&self, query: &IssueListQuery) -> RepoResult<Vec<Issue>> {
        let mut sql = format!("{ISSUE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(template_id) = &query.template_id {
            sql.push_str(" AND template_id = ?");
            bind_values.push(Value::Text(template_id.clone()));
        }

        sql.push(' ');
        sql.push_str(NUMBER_ORDER_SQL);

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut issues = Vec::new();
        while let Some(row) = rows.next()? {
            issues.push(parse_issue_row(row)?);
        }
        Ok(issues)
    }

    fn delete_issue(&self, id: IssueId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM certificate_issues WHERE issue_uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

impl NumberStore for SqliteIssueRepository<'_> {
    fn max_number(&self) -> RepoResult<IssueNumber> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(certificate_number), 0)
             FROM certificate_issues
             WHERE certificate_number > 0;",
            [],
            |row| row.get(0),
        )?;
        number_from_db(max, "MAX(certificate_issues.certificate_number)")
    }

    fn number_exists(&self, number: IssueNumber) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM certificate_issues
                WHERE certificate_number = ?1
            );",
            [i64::from(number)],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn set_number(&self, id: IssueId, number: IssueNumber) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE certificate_issues
                 SET certificate_number = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE issue_uuid = ?1;",
                params![id.to_string(), i64::from(number)],
            )
            .map_err(|err| map_number_write_error(err, number))?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn list_by_number_ascending(&self) -> RepoResult<Vec<Issue>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ISSUE_SELECT_SQL} {NUMBER_ORDER_SQL};"))?;
        let mut rows = stmt.query([])?;
        let mut issues = Vec::new();
        while let Some(row) = rows.next()? {
            issues.push(parse_issue_row(row)?);
        }
        Ok(issues)
    }

    fn issue_by_id(&self, id: IssueId) -> RepoResult<Option<Issue>> {
        load_issue(self.conn, id)
    }

    fn park_numbers(&self) -> RepoResult<usize> {
        // Negation keeps parked values distinct and disjoint from 1..=N.
        let parked = self.conn.execute(
            "UPDATE certificate_issues
             SET certificate_number = -certificate_number
             WHERE certificate_number > 0;",
            [],
        )?;
        Ok(parked)
    }

    fn number_summary(&self) -> RepoResult<NumberSummary> {
        let (live, numbered, min, max): (i64, i64, Option<i64>, Option<i64>) =
            self.conn.query_row(
                "SELECT
                    COUNT(*),
                    COUNT(CASE WHEN certificate_number > 0 THEN 1 END),
                    MIN(CASE WHEN certificate_number > 0 THEN certificate_number END),
                    MAX(CASE WHEN certificate_number > 0 THEN certificate_number END)
                 FROM certificate_issues;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(NumberSummary {
            live: live as u64,
            numbered: numbered as u64,
            min: min
                .map(|value| number_from_db(value, "certificate_issues.certificate_number"))
                .transpose()?,
            max: max
                .map(|value| number_from_db(value, "certificate_issues.certificate_number"))
                .transpose()?,
        })
    }
}

impl ScopedNumberStore for SqliteIssueRepository<'_> {
    fn in_sequence_scope<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn NumberStore) -> Result<T, E>,
        E: From<RepoError>,
    {
        // IMMEDIATE takes the write lock up front, so the read-probe-write
        // sequence inside `f` cannot interleave with another writer.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;

        let outcome = {
            let conn: &Connection = &tx;
            f(&SqliteIssueRepository { conn })
        };

        match outcome {
            Ok(value) => {
                tx.commit().map_err(RepoError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=sequence_scope module=repo status=error error_code=rollback_failed error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

fn load_issue(conn: &Connection, id: IssueId) -> RepoResult<Option<Issue>> {
    let mut stmt = conn.prepare(&format!("{ISSUE_SELECT_SQL} WHERE issue_uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_issue_row(row)?));
    }
    Ok(None)
}

fn parse_issue_row(row: &Row<'_>) -> RepoResult<Issue> {
    let id_text: String = row.get("issue_uuid")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{id_text}` in certificate_issues.issue_uuid"
        ))
    })?;

    let number = match row.get::<_, Option<i64>>("certificate_number")? {
        None | Some(0) => None,
        Some(value) if value < 0 => {
            return Err(RepoError::InvalidData(format!(
                "parked number `{value}` visible outside compaction in certificate_issues.certificate_number"
            )));
        }
        Some(value) => Some(number_from_db(
            value,
            "certificate_issues.certificate_number",
        )?),
    };

    let issue = Issue {
        id,
        template_id: row.get("template_id")?,
        user_id: row.get("user_id")?,
        code: row.get("code")?,
        number,
        issued_at: row.get("issued_at")?,
        expires_at: row.get("expires_at")?,
    };
    issue.validate()?;
    Ok(issue)
}

pub(crate) fn number_from_db(value: i64, column: &str) -> RepoResult<IssueNumber> {
    IssueNumber::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("number `{value}` out of range in {column}")))
}

fn map_number_write_error(err: rusqlite::Error, number: IssueNumber) -> RepoError {
    let is_unique_violation = matches!(
        &err,
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message
                    .as_deref()
                    .map_or(true, |text| text.contains("certificate_number"))
    );
    if is_unique_violation {
        RepoError::DuplicateNumber(number)
    } else {
        err.into()
    }
}
