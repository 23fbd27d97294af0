//! Certificate number sequence: generation, allocation and compaction.
//!
//! # Responsibility
//! - Compute the next candidate number (`generator`).
//! - Assign a unique number to one issue under the sequence lock
//!   (`allocator`).
//! - Renumber live issues to a gapless `1..=N` run after deletions
//!   (`compactor`).
//!
//! # Invariants
//! - Every mutation runs inside `ScopedNumberStore::in_sequence_scope`.
//! - No partial numbering is ever committed.

pub mod allocator;
pub mod compactor;
pub mod error;
pub mod generator;

#[cfg(test)]
pub(crate) mod memory_store;

/// Identity of a numbering space.
///
/// Numbering is global across all templates today: one sequence covers the
/// whole issue table, and the sequence lock is the database write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SequenceScope {
    #[default]
    Global,
}

impl SequenceScope {
    /// Stable label used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
        }
    }
}
