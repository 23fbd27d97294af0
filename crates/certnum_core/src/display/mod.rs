//! Display selection for the certificate number element.
//!
//! # Responsibility
//! - Decode the element's persisted configuration once, at the boundary.
//! - Pick the allocated number or the pass-through code and forward it to a
//!   renderer.
//!
//! # Invariants
//! - Formatting only writes to the store on the lazy-assignment path.

pub mod config;
pub mod selector;
