//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and sequence calls into issuance use-cases.
//! - Keep CLI/host layers decoupled from storage details.

pub mod issue_service;
