//! # SLA Deadlines
//!
//! Fixed resolution windows per priority.
//!
//! | Priority   | Window |
//! |------------|--------|
//! | low        | 72h    |
//! | medium     | 48h    |
//! | high       | 24h    |
//! | emergency  | 6h     |

use chrono::{DateTime, Duration, Utc};

use crate::types::Priority;

/// Resolution window in hours for a priority.
pub const fn sla_hours(priority: Priority) -> i64 {
    match priority {
        Priority::Low => 72,
        Priority::Medium => 48,
        Priority::High => 24,
        Priority::Emergency => 6,
    }
}

/// Deadline for a request of `priority` created at `created_at`.
pub fn sla_deadline(priority: Priority, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(sla_hours(priority))
}
