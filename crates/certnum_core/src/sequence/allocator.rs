//! Unique number assignment for one issue.
//!
//! # Responsibility
//! - Assign the next free number to an unnumbered issue.
//! - Return the existing number unchanged for numbered issues.
//!
//! # Invariants
//! - Read max, probe and write happen inside one sequence scope; the probe
//!   only guards against holes left by out-of-order writes, never against
//!   concurrent writers.
//! - A failed assignment leaves the issue unnumbered.

use crate::model::issue::{IssueId, IssueNumber};
use crate::repo::issue_repo::{NumberStore, ScopedNumberStore};
use crate::sequence::error::{SequenceError, SequenceResult};
use crate::sequence::generator::next_number;
use crate::sequence::SequenceScope;
use log::{debug, error, info};
use std::time::Instant;

/// Outcome of one assignment inside a sequence scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Issue already held this number; nothing was written.
    Existing(IssueNumber),
    /// Number was allocated and persisted by this call.
    Assigned(IssueNumber),
}

impl Assignment {
    pub fn number(self) -> IssueNumber {
        match self {
            Self::Existing(number) | Self::Assigned(number) => number,
        }
    }
}

/// Allocates numbers from the global sequence.
pub struct Allocator<'s, S> {
    store: &'s S,
    scope: SequenceScope,
}

impl<'s, S: ScopedNumberStore> Allocator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            scope: SequenceScope::Global,
        }
    }

    /// Assigns a number to `id`, or returns the one it already holds.
    ///
    /// # Errors
    /// - `RecordNotFound` when `id` is unknown.
    /// - `Timeout` when the sequence lock is not acquired in time.
    /// - `StorageUnavailable` on any other store failure.
    pub fn assign(&self, id: IssueId) -> SequenceResult<IssueNumber> {
        self.assign_detailed(id).map(Assignment::number)
    }

    /// Same as [`Allocator::assign`] but reports whether a write happened.
    pub fn assign_detailed(&self, id: IssueId) -> SequenceResult<Assignment> {
        let started_at = Instant::now();
        let result = self.store.in_sequence_scope(|store| assign_in(store, id));

        match &result {
            Ok(Assignment::Assigned(number)) => info!(
                "event=number_assign module=sequence status=ok scope={} issue_id={} number={} duration_ms={}",
                self.scope.as_str(),
                id,
                number,
                started_at.elapsed().as_millis()
            ),
            Ok(Assignment::Existing(number)) => debug!(
                "event=number_assign module=sequence status=skipped scope={} issue_id={} number={}",
                self.scope.as_str(),
                id,
                number
            ),
            Err(err) => error!(
                "event=number_assign module=sequence status=error scope={} issue_id={} duration_ms={} error_code={} error={}",
                self.scope.as_str(),
                id,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }

        result
    }

    /// Returns the number the next assignment would receive, without
    /// writing or taking the sequence lock.
    pub fn peek_next(&self) -> SequenceResult<IssueNumber> {
        probe_candidate(self.store)
    }
}

/// Assigns inside an already-open sequence scope.
pub fn assign_in(store: &dyn NumberStore, id: IssueId) -> SequenceResult<Assignment> {
    let issue = store
        .issue_by_id(id)?
        .ok_or(SequenceError::RecordNotFound(id))?;
    if let Some(number) = issue.number {
        return Ok(Assignment::Existing(number));
    }

    let candidate = probe_candidate(store)?;
    store.set_number(id, candidate)?;
    Ok(Assignment::Assigned(candidate))
}

fn probe_candidate(store: &dyn NumberStore) -> SequenceResult<IssueNumber> {
    let mut candidate = next_number(store.max_number()?);
    while store.number_exists(candidate)? {
        candidate = candidate.checked_add(1).ok_or(SequenceError::Exhausted)?;
    }
    Ok(candidate.max(1))
}

#[cfg(test)]
mod tests {
    use super::{assign_in, Allocator, Assignment};
    use crate::model::issue::Issue;
    use crate::repo::issue_repo::{NumberStore, ScopedNumberStore};
    use crate::sequence::error::SequenceError;
    use crate::sequence::memory_store::MemoryStore;
    use uuid::Uuid;

    #[test]
    fn sequential_assignments_are_dense_from_one() {
        let store = MemoryStore::default();
        let ids: Vec<_> = (0..5).map(|_| store.insert(Issue::new("tpl", "u"))).collect();
        let allocator = Allocator::new(&store);

        let numbers: Vec<_> = ids.iter().map(|id| allocator.assign(*id).unwrap()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn numbered_issue_is_returned_without_write() {
        let store = MemoryStore::default();
        let id = store.insert(Issue::new("tpl", "u"));
        let allocator = Allocator::new(&store);
        assert_eq!(allocator.assign(id).unwrap(), 1);
        let writes_before = store.writes();

        let outcome = allocator.assign_detailed(id).unwrap();
        assert_eq!(outcome, Assignment::Existing(1));
        assert_eq!(store.writes(), writes_before);
    }

    #[test]
    fn holes_below_max_are_not_reused() {
        let store = MemoryStore::default();
        let mut high = Issue::new("tpl", "u");
        high.number = Some(7);
        store.insert(high);
        let id = store.insert(Issue::new("tpl", "u"));

        assert_eq!(Allocator::new(&store).assign(id).unwrap(), 8);
    }

    #[test]
    fn probe_walks_past_taken_candidates() {
        let store = MemoryStore::default();
        let id = store.insert(Issue::new("tpl", "u"));
        // A stale max read: the store reports 2 but 3 and 4 are taken.
        store.set_reported_max(Some(2));
        for number in [3, 4] {
            let mut taken = Issue::new("tpl", "u");
            taken.number = Some(number);
            store.insert(taken);
        }

        let number = store.in_sequence_scope(|s| assign_in(s, id)).unwrap();
        assert_eq!(number, Assignment::Assigned(5));
    }

    #[test]
    fn unknown_issue_is_record_not_found() {
        let store = MemoryStore::default();
        let missing = Uuid::new_v4();
        let err = Allocator::new(&store).assign(missing).unwrap_err();
        assert!(matches!(err, SequenceError::RecordNotFound(id) if id == missing));
    }

    #[test]
    fn exhausted_sequence_is_reported() {
        let store = MemoryStore::default();
        let mut top = Issue::new("tpl", "u");
        top.number = Some(u32::MAX);
        store.insert(top);
        let id = store.insert(Issue::new("tpl", "u"));

        let err = Allocator::new(&store).assign(id).unwrap_err();
        assert!(matches!(err, SequenceError::Exhausted));
        assert_eq!(store.issue_by_id(id).unwrap().unwrap().number, None);
    }

    #[test]
    fn peek_next_does_not_write() {
        let store = MemoryStore::default();
        store.insert(Issue::new("tpl", "u"));
        let allocator = Allocator::new(&store);

        assert_eq!(allocator.peek_next().unwrap(), 1);
        assert_eq!(allocator.peek_next().unwrap(), 1);
        assert_eq!(store.writes(), 0);
    }
}
