//! Renumbering of live issues after deletions.
//!
//! # Responsibility
//! - Rewrite live numbers to `1..=N`, keeping their relative order.
//!
//! # Invariants
//! - Numbers are first parked in a disjoint range, then reassigned, so no
//!   intermediate write collides with a number still held by another issue.
//! - The result is verified before commit; a gap or duplicate rolls the
//!   whole scope back.
//! - Already-compact numbering is left untouched.

use crate::model::issue::IssueNumber;
use crate::repo::issue_repo::{NumberStore, ScopedNumberStore};
use crate::sequence::error::{SequenceError, SequenceResult};
use crate::sequence::SequenceScope;
use log::{error, info};
use std::time::Instant;

/// Summary of one compaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Live issues after compaction; also the highest number.
    pub live: usize,
    /// Issues whose number changed.
    pub renumbered: usize,
}

pub struct Compactor<'s, S> {
    store: &'s S,
    scope: SequenceScope,
}

impl<'s, S: ScopedNumberStore> Compactor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            scope: SequenceScope::Global,
        }
    }

    /// Renumbers all live issues to a gapless run starting at 1.
    ///
    /// Call after any deletion (or batch of deletions) of numbered issues.
    /// Excludes concurrent assignments for its whole duration.
    pub fn compact(&self) -> SequenceResult<CompactionReport> {
        let started_at = Instant::now();
        let result = self.store.in_sequence_scope(compact_in);

        match &result {
            Ok(report) => info!(
                "event=number_compact module=sequence status=ok scope={} live={} renumbered={} duration_ms={}",
                self.scope.as_str(),
                report.live,
                report.renumbered,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=number_compact module=sequence status=error scope={} duration_ms={} error_code={} error={}",
                self.scope.as_str(),
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }

        result
    }
}

/// Compacts inside an already-open sequence scope.
pub fn compact_in(store: &dyn NumberStore) -> SequenceResult<CompactionReport> {
    let issues = store.list_by_number_ascending()?;
    let targets = issues
        .iter()
        .enumerate()
        .map(|(index, issue)| position_number(index).map(|target| (issue, target)))
        .collect::<SequenceResult<Vec<_>>>()?;

    let renumbered = targets
        .iter()
        .filter(|(issue, target)| issue.number != Some(*target))
        .count();
    if renumbered == 0 {
        return Ok(CompactionReport {
            live: issues.len(),
            renumbered,
        });
    }

    store.park_numbers()?;
    for (issue, target) in &targets {
        store.set_number(issue.id, *target)?;
    }

    let summary = store.number_summary()?;
    if !summary.is_gapless() || summary.live != issues.len() as u64 {
        return Err(SequenceError::InvariantViolation(format!(
            "after compaction live={} numbered={} min={:?} max={:?}, expected 1..={}",
            summary.live,
            summary.numbered,
            summary.min,
            summary.max,
            issues.len()
        )));
    }

    Ok(CompactionReport {
        live: issues.len(),
        renumbered,
    })
}

fn position_number(index: usize) -> SequenceResult<IssueNumber> {
    index
        .checked_add(1)
        .and_then(|position| IssueNumber::try_from(position).ok())
        .ok_or(SequenceError::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::{CompactionReport, Compactor};
    use crate::model::issue::Issue;
    use crate::repo::issue_repo::NumberStore;
    use crate::sequence::error::SequenceError;
    use crate::sequence::memory_store::MemoryStore;

    fn numbered(store: &MemoryStore, number: u32) -> uuid::Uuid {
        let mut issue = Issue::new("tpl", "u");
        issue.number = Some(number);
        store.insert(issue)
    }

    #[test]
    fn gaps_are_closed_in_order() {
        let store = MemoryStore::default();
        let a = numbered(&store, 2);
        let b = numbered(&store, 5);
        let c = numbered(&store, 9);

        let report = Compactor::new(&store).compact().unwrap();
        assert_eq!(report, CompactionReport { live: 3, renumbered: 3 });
        assert_eq!(store.number_of(a), Some(1));
        assert_eq!(store.number_of(b), Some(2));
        assert_eq!(store.number_of(c), Some(3));
    }

    #[test]
    fn renumbering_never_writes_a_held_number() {
        // The memory store rejects duplicates just like the unique index.
        let store = MemoryStore::default();
        let a = numbered(&store, 2);
        let b = numbered(&store, 3);
        let c = numbered(&store, 4);

        Compactor::new(&store).compact().unwrap();
        assert_eq!(
            [store.number_of(a), store.number_of(b), store.number_of(c)],
            [Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn compact_numbering_is_left_untouched() {
        let store = MemoryStore::default();
        numbered(&store, 1);
        numbered(&store, 2);

        let report = Compactor::new(&store).compact().unwrap();
        assert_eq!(report.renumbered, 0);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn unnumbered_issues_are_numbered_after_numbered_ones() {
        let store = MemoryStore::default();
        let mut pending = Issue::new("tpl", "u");
        pending.issued_at = 1;
        let pending = store.insert(pending);
        let held = numbered(&store, 4);

        Compactor::new(&store).compact().unwrap();
        assert_eq!(store.number_of(held), Some(1));
        assert_eq!(store.number_of(pending), Some(2));
    }

    #[test]
    fn failed_verification_rolls_back() {
        let store = MemoryStore::default();
        let a = numbered(&store, 3);
        let b = numbered(&store, 6);
        store.corrupt_summary();

        let err = Compactor::new(&store).compact().unwrap_err();
        assert!(matches!(err, SequenceError::InvariantViolation(_)));
        assert_eq!(store.number_of(a), Some(3));
        assert_eq!(store.number_of(b), Some(6));
        assert_eq!(store.number_summary().unwrap().numbered, 2);
    }
}
