//! # Edit Lock Rules
//!
//! Pure expiry logic for the advisory edit lock on a request.
//!
//! The lock is a cooperative token: it does not stop writes, it only tells
//! a second editor that someone else has the request open. Expiry is lazy
//! and evaluated only when the next `acquire` happens.
//!
//! ```text
//!   locked_at                       locked_at + timeout
//!      │◄──────── held ──────────────────►│◄──── expired (free) ────
//!      │  other actors get `Locked`       │  anyone may take it over
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Default lock lifetime in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 300;

/// Result of an acquire attempt. Both variants are normal outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LockOutcome {
    /// The caller now holds the lock (fresh grant, refresh or takeover).
    Acquired {
        #[ts(as = "String")]
        locked_at: DateTime<Utc>,
    },
    /// Someone else holds a live lock.
    Locked {
        holder: String,
        #[ts(as = "String")]
        locked_at: DateTime<Utc>,
    },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired { .. })
    }
}

/// Lock timeout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    timeout: Duration,
}

impl LockPolicy {
    pub fn new(timeout_secs: i64) -> Self {
        LockPolicy {
            timeout: Duration::seconds(timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Locks stamped before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.timeout
    }

    pub fn is_expired(&self, locked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        locked_at < self.cutoff(now)
    }

    /// Whether `actor` may take the lock given the current holder.
    pub fn can_acquire(
        &self,
        holder: Option<&str>,
        locked_at: Option<DateTime<Utc>>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match (holder, locked_at) {
            (None, _) => true,
            (Some(h), _) if h == actor => true,
            (Some(_), None) => true,
            (Some(_), Some(at)) => self.is_expired(at, now),
        }
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy::new(DEFAULT_LOCK_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_free_lock_can_be_taken() {
        let policy = LockPolicy::default();
        assert!(policy.can_acquire(None, None, "ana", t0()));
    }

    #[test]
    fn test_holder_can_refresh() {
        let policy = LockPolicy::default();
        assert!(policy.can_acquire(Some("ana"), Some(t0()), "ana", t0()));
    }

    #[test]
    fn test_other_actor_blocked_within_timeout() {
        let policy = LockPolicy::default();
        let now = t0() + Duration::seconds(299);
        assert!(!policy.can_acquire(Some("ana"), Some(t0()), "bruno", now));
    }

    #[test]
    fn test_other_actor_takes_over_after_timeout() {
        let policy = LockPolicy::default();
        let now = t0() + Duration::seconds(301);
        assert!(policy.can_acquire(Some("ana"), Some(t0()), "bruno", now));
    }

    #[test]
    fn test_custom_timeout() {
        let policy = LockPolicy::new(60);
        assert!(policy.is_expired(t0(), t0() + Duration::seconds(61)));
        assert!(!policy.is_expired(t0(), t0() + Duration::seconds(59)));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = LockOutcome::Locked {
            holder: "ana".into(),
            locked_at: t0(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "locked");
        assert_eq!(json["holder"], "ana");
    }
}
