//! Issued certificate model.
//!
//! # Responsibility
//! - Define the record that receives a presentable sequence number.
//! - Validate record fields before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another issue.
//! - `number == None` means unassigned; `Some(0)` is never produced.
//! - `expires_at` should not be earlier than `issued_at` when set.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier of one issued certificate.
pub type IssueId = Uuid;

/// Presentable certificate number. Always `>= 1` once assigned.
pub type IssueNumber = u32;

const CODE_LEN: usize = 10;

/// One issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    /// Template the certificate was issued from.
    pub template_id: String,
    /// Recipient of the certificate.
    pub user_id: String,
    /// Pass-through verification code, shown when numbering is not selected.
    pub code: String,
    /// Allocated sequence number, `None` until assigned.
    pub number: Option<IssueNumber>,
    /// Unix epoch milliseconds.
    pub issued_at: i64,
    /// Unix epoch milliseconds.
    pub expires_at: Option<i64>,
}

/// Validation errors for issue fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueValidationError {
    BlankField(&'static str),
    ZeroNumber,
    ExpiresBeforeIssued { issued_at: i64, expires_at: i64 },
}

impl Display for IssueValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "issue field `{field}` must not be blank"),
            Self::ZeroNumber => write!(f, "issue number must be positive when assigned"),
            Self::ExpiresBeforeIssued {
                issued_at,
                expires_at,
            } => write!(
                f,
                "expires_at ({expires_at}) must be >= issued_at ({issued_at})"
            ),
        }
    }
}

impl Error for IssueValidationError {}

impl Issue {
    /// Creates an unnumbered issue with a generated id and code, issued now.
    pub fn new(template_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            template_id: template_id.into(),
            user_id: user_id.into(),
            code: code_from_id(id),
            number: None,
            issued_at: now_epoch_ms(),
            expires_at: None,
        }
    }

    /// Returns whether the allocator has already numbered this issue.
    pub fn is_numbered(&self) -> bool {
        self.number.is_some()
    }

    pub fn validate(&self) -> Result<(), IssueValidationError> {
        for (field, value) in [
            ("template_id", &self.template_id),
            ("user_id", &self.user_id),
            ("code", &self.code),
        ] {
            if value.trim().is_empty() {
                return Err(IssueValidationError::BlankField(field));
            }
        }

        if self.number == Some(0) {
            return Err(IssueValidationError::ZeroNumber);
        }

        if let Some(expires_at) = self.expires_at {
            if expires_at < self.issued_at {
                return Err(IssueValidationError::ExpiresBeforeIssued {
                    issued_at: self.issued_at,
                    expires_at,
                });
            }
        }

        Ok(())
    }
}

/// Derives a short uppercase verification code from the issue id.
fn code_from_id(id: IssueId) -> String {
    id.simple()
        .to_string()
        .chars()
        .take(CODE_LEN)
        .collect::<String>()
        .to_ascii_uppercase()
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| millis_to_i64(elapsed.as_millis()))
        .unwrap_or(0)
}

fn millis_to_i64(millis: u128) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{millis_to_i64, Issue, IssueValidationError};

    #[test]
    fn new_issue_is_unnumbered_with_generated_code() {
        let issue = Issue::new("tpl-1", "user-1");
        assert!(!issue.is_numbered());
        assert_eq!(issue.code.len(), 10);
        assert!(issue.code.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(issue.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_fields_and_zero_number() {
        let mut issue = Issue::new(" ", "user-1");
        assert_eq!(
            issue.validate(),
            Err(IssueValidationError::BlankField("template_id"))
        );

        issue.template_id = "tpl".to_string();
        issue.number = Some(0);
        assert_eq!(issue.validate(), Err(IssueValidationError::ZeroNumber));
    }

    #[test]
    fn validate_rejects_expiry_before_issue() {
        let mut issue = Issue::new("tpl", "user");
        issue.issued_at = 200;
        issue.expires_at = Some(100);
        assert!(matches!(
            issue.validate(),
            Err(IssueValidationError::ExpiresBeforeIssued { .. })
        ));
    }

    #[test]
    fn millis_conversion_saturates_instead_of_wrapping() {
        assert_eq!(millis_to_i64(1_700_000_000_000), 1_700_000_000_000);
        assert_eq!(millis_to_i64(u128::from(u64::MAX)), i64::MAX);
    }
}
