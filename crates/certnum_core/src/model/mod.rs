//! Domain model for issued certificates.
//!
//! # Responsibility
//! - Define the canonical issued-record shape consumed by the allocator.
//!
//! # Invariants
//! - Every issue is identified by a stable `IssueId`.
//! - A presentable number is optional and strictly positive when present.

pub mod issue;
