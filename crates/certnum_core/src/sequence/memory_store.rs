//! In-memory number store used by sequence unit tests.
//!
//! Mirrors the SQLite contract closely enough to exercise the algorithms:
//! duplicate positive numbers are rejected and a failed scope restores the
//! snapshot taken when it started.

use crate::model::issue::{Issue, IssueId, IssueNumber};
use crate::repo::issue_repo::{
    NumberStore, NumberSummary, RepoError, RepoResult, ScopedNumberStore,
};
use std::cell::{Cell, RefCell};

#[derive(Clone)]
struct Row {
    issue: Issue,
    raw: Option<i64>,
}

impl Row {
    fn number(&self) -> Option<IssueNumber> {
        self.raw
            .filter(|value| *value > 0)
            .and_then(|value| IssueNumber::try_from(value).ok())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: RefCell<Vec<Row>>,
    writes: Cell<usize>,
    reported_max: Cell<Option<IssueNumber>>,
    corrupt_summary: Cell<bool>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, issue: Issue) -> IssueId {
        let id = issue.id;
        let raw = issue.number.map(i64::from);
        self.rows.borrow_mut().push(Row { issue, raw });
        id
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.get()
    }

    pub(crate) fn number_of(&self, id: IssueId) -> Option<IssueNumber> {
        self.rows
            .borrow()
            .iter()
            .find(|row| row.issue.id == id)
            .and_then(Row::number)
    }

    /// Makes `max_number` return a stale value.
    pub(crate) fn set_reported_max(&self, max: Option<IssueNumber>) {
        self.reported_max.set(max);
    }

    /// Makes `number_summary` report a gap.
    pub(crate) fn corrupt_summary(&self) {
        self.corrupt_summary.set(true);
    }

    fn to_issue(row: &Row) -> Issue {
        Issue {
            number: row.number(),
            ..row.issue.clone()
        }
    }
}

impl NumberStore for MemoryStore {
    fn max_number(&self) -> RepoResult<IssueNumber> {
        if let Some(max) = self.reported_max.get() {
            return Ok(max);
        }
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter_map(Row::number)
            .max()
            .unwrap_or(0))
    }

    fn number_exists(&self, number: IssueNumber) -> RepoResult<bool> {
        let wanted = i64::from(number);
        Ok(self.rows.borrow().iter().any(|row| row.raw == Some(wanted)))
    }

    fn set_number(&self, id: IssueId, number: IssueNumber) -> RepoResult<()> {
        let wanted = i64::from(number);
        let mut rows = self.rows.borrow_mut();
        if rows
            .iter()
            .any(|row| row.issue.id != id && row.raw == Some(wanted))
        {
            return Err(RepoError::DuplicateNumber(number));
        }
        let row = rows
            .iter_mut()
            .find(|row| row.issue.id == id)
            .ok_or(RepoError::NotFound(id))?;
        row.raw = Some(wanted);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn list_by_number_ascending(&self) -> RepoResult<Vec<Issue>> {
        let mut rows = self.rows.borrow().clone();
        rows.sort_by_key(|row| {
            (
                row.number().is_none(),
                row.number(),
                row.issue.issued_at,
                row.issue.id,
            )
        });
        Ok(rows.iter().map(Self::to_issue).collect())
    }

    fn issue_by_id(&self, id: IssueId) -> RepoResult<Option<Issue>> {
        Ok(self
            .rows
            .borrow()
            .iter()
            .find(|row| row.issue.id == id)
            .map(Self::to_issue))
    }

    fn park_numbers(&self) -> RepoResult<usize> {
        let mut parked = 0;
        for row in self.rows.borrow_mut().iter_mut() {
            if let Some(value) = row.raw.filter(|value| *value > 0) {
                row.raw = Some(-value);
                parked += 1;
            }
        }
        self.writes.set(self.writes.get() + 1);
        Ok(parked)
    }

    fn number_summary(&self) -> RepoResult<NumberSummary> {
        let rows = self.rows.borrow();
        let numbers: Vec<_> = rows.iter().filter_map(Row::number).collect();
        let mut max = numbers.iter().copied().max();
        if self.corrupt_summary.get() {
            max = max.map(|value| value + 1);
        }
        Ok(NumberSummary {
            live: rows.len() as u64,
            numbered: numbers.len() as u64,
            min: numbers.iter().copied().min(),
            max,
        })
    }
}

impl ScopedNumberStore for MemoryStore {
    fn in_sequence_scope<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn NumberStore) -> Result<T, E>,
        E: From<RepoError>,
    {
        let snapshot = self.rows.borrow().clone();
        let outcome = f(self);
        if outcome.is_err() {
            *self.rows.borrow_mut() = snapshot;
        }
        outcome
    }
}
