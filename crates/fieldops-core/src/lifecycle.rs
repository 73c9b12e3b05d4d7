//! # Request Lifecycle Rules
//!
//! The explicit transition table for [`RequestStatus`].
//!
//! ## Transition Table
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────┐
//! │ from         │ allowed targets                                      │
//! ├──────────────┼──────────────────────────────────────────────────────┤
//! │ open         │ assigned, scheduled, cancelled                       │
//! │ assigned     │ scheduled, in_progress, cancelled                    │
//! │ scheduled    │ assigned, in_progress, cancelled                     │
//! │ in_progress  │ paused, completed, cancelled                         │
//! │ paused       │ in_progress, cancelled                               │
//! │ completed    │ confirmed, in_progress (reopen), cancelled           │
//! │ confirmed    │ -                                                    │
//! │ cancelled    │ -                                                    │
//! └──────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! A non-terminal request may also be "moved" to its current status. That
//! is how callers update the side-channel fields (materials used, next
//! maintenance) without changing the status.

use crate::error::{CoreError, CoreResult};
use crate::types::RequestStatus;

/// Targets reachable from `from` in one step (excluding the self-move).
pub fn allowed_targets(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;

    match from {
        Open => &[Assigned, Scheduled, Cancelled],
        Assigned => &[Scheduled, InProgress, Cancelled],
        Scheduled => &[Assigned, InProgress, Cancelled],
        InProgress => &[Paused, Completed, Cancelled],
        Paused => &[InProgress, Cancelled],
        Completed => &[Confirmed, InProgress, Cancelled],
        Confirmed | Cancelled => &[],
    }
}

/// Whether `from → to` is a legal move.
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    if from == to {
        return !from.is_terminal();
    }
    allowed_targets(from).contains(&to)
}

/// Validates a status change.
///
/// ## Errors
/// [`CoreError::InvalidTransition`] when the table forbids the move.
pub fn validate_transition(from: RequestStatus, to: RequestStatus) -> CoreResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Status a request takes when a technician is assigned.
///
/// `open` advances to `scheduled`; every other non-terminal status is kept,
/// which makes re-assignment idempotent.
pub fn status_after_assignment(current: RequestStatus) -> CoreResult<RequestStatus> {
    if current.is_terminal() {
        return Err(CoreError::InvalidState {
            entity: "Request".to_string(),
            status: current.to_string(),
            operation: "assign a responsible".to_string(),
        });
    }

    Ok(match current {
        RequestStatus::Open => RequestStatus::Scheduled,
        other => other,
    })
}

/// Confirmation is only valid once the work is completed.
pub fn ensure_confirmable(current: RequestStatus) -> CoreResult<()> {
    if current == RequestStatus::Completed {
        Ok(())
    } else {
        Err(CoreError::InvalidState {
            entity: "Request".to_string(),
            status: current.to_string(),
            operation: "confirm".to_string(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
