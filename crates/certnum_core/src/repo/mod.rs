//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the record store contract consumed by the sequence allocator.
//! - Isolate SQLite query details from sequence/service orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `Issue::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateNumber`)
//!   in addition to DB transport errors.
//! - Constructors verify schema shape and never alter it.

pub mod archive_repo;
pub mod issue_repo;
mod schema;
