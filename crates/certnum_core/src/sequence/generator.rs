//! Next-candidate computation for the number sequence.

use crate::model::issue::IssueNumber;

/// Returns the next candidate number given the current maximum.
///
/// `current_max` is `0` when nothing is numbered. The result is never `0`;
/// at the top of the range it saturates and the allocator's probe reports
/// exhaustion.
pub fn next_number(current_max: IssueNumber) -> IssueNumber {
    if current_max >= 1 {
        current_max.saturating_add(1)
    } else {
        1
    }
}
