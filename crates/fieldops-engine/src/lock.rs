//! # Edit Lock Service
//!
//! Advisory, time-limited lock that tells other users someone is editing a
//! request. Nothing else in the engine checks it.
//!
//! ```text
//!   acquire(actor) ──► UPDATE … WHERE free OR mine OR stale ──► 1 row?
//!                                                   │            │
//!                                                   │ yes        │ no
//!                                                   ▼            ▼
//!                                               Acquired     read holder ──► Locked
//! ```
//!
//! A lock older than the policy timeout is treated as free; no sweeper
//! ever clears it.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use fieldops_core::{Actor, LockOutcome};

use crate::collaborators::events::{REQUEST_LOCKED, REQUEST_UNLOCKED};
use crate::context::Context;
use crate::error::{ServiceError, ServiceResult};

/// Grant attempts before giving up on a lock that keeps changing hands.
const MAX_ATTEMPTS: usize = 2;

pub struct LockService {
    ctx: Arc<Context>,
}

impl LockService {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        LockService { ctx }
    }

    /// Takes or refreshes the lock. A live lock held by someone else is
    /// reported as [`LockOutcome::Locked`], not as an error.
    pub async fn acquire(&self, id: &str, actor: &Actor) -> ServiceResult<LockOutcome> {
        let policy = self.ctx.lock_policy;
        let mut last_holder = None;

        for _ in 0..MAX_ATTEMPTS {
            let now = self.ctx.now();
            let granted = self
                .ctx
                .db
                .requests()
                .try_lock(id, &actor.id, now, policy.cutoff(now))
                .await?;

            if granted {
                debug!(id = %id, actor = %actor.id, "Edit lock granted");
                self.ctx.publish(
                    REQUEST_LOCKED,
                    json!({ "id": id, "locked_by": actor.id, "locked_at": now }),
                );
                return Ok(LockOutcome::Acquired { locked_at: now });
            }

            let state = self
                .ctx
                .db
                .requests()
                .lock_state(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Request", id))?;

            if let (Some(holder), Some(locked_at)) = (state.locked_by, state.locked_at) {
                if !policy.can_acquire(Some(&holder), Some(locked_at), &actor.id, now) {
                    return Ok(LockOutcome::Locked { holder, locked_at });
                }
                last_holder = Some(holder);
            }
        }

        info!(id = %id, actor = %actor.id, "Edit lock kept changing hands");
        Err(ServiceError::Conflict {
            holder: last_holder.unwrap_or_else(|| "another user".to_string()),
        })
    }

    /// Like [`acquire`](Self::acquire), but a live lock held by someone
    /// else becomes [`ServiceError::Conflict`].
    pub async fn require(&self, id: &str, actor: &Actor) -> ServiceResult<()> {
        match self.acquire(id, actor).await? {
            LockOutcome::Acquired { .. } => Ok(()),
            LockOutcome::Locked { holder, .. } => Err(ServiceError::Conflict { holder }),
        }
    }

    /// Clears the lock if `actor` holds it. Returns whether anything was
    /// cleared; releasing someone else's lock is a no-op.
    pub async fn release(&self, id: &str, actor: &Actor) -> ServiceResult<bool> {
        let released = self.ctx.db.requests().unlock(id, &actor.id).await?;

        if !released {
            self.ctx.ensure_request(id).await?;
            return Ok(false);
        }

        debug!(id = %id, actor = %actor.id, "Edit lock released");
        self.ctx
            .publish(REQUEST_UNLOCKED, json!({ "id": id, "released_by": actor.id }));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::testing::{dispatcher, new_request, technician, Harness};
    use crate::ErrorCode;
    use chrono::Duration;

    async fn setup() -> (Harness, String) {
        let h = Harness::new().await.unwrap();
        let request = h
            .engine
            .requests()
            .create(new_request(), &dispatcher())
            .await
            .unwrap();
        (h, request.id)
    }

    #[tokio::test]
    async fn test_grant_and_refresh() {
        let (h, id) = setup().await;
        let locks = h.engine.locks();

        let first = locks.acquire(&id, &dispatcher()).await.unwrap();
        assert_eq!(first, LockOutcome::Acquired { locked_at: h.clock.now() });

        h.clock.advance(Duration::seconds(200));
        let refreshed = locks.acquire(&id, &dispatcher()).await.unwrap();
        assert_eq!(refreshed, LockOutcome::Acquired { locked_at: h.clock.now() });

        let stored = h.db.requests().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.locked_by.as_deref(), Some("user-1"));
        assert_eq!(stored.locked_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_live_lock_reports_holder() {
        let (h, id) = setup().await;
        let locks = h.engine.locks();
        let locked_at = h.clock.now();
        locks.acquire(&id, &dispatcher()).await.unwrap();

        h.clock.advance(Duration::seconds(299));
        let outcome = locks.acquire(&id, &technician()).await.unwrap();
        assert_eq!(
            outcome,
            LockOutcome::Locked {
                holder: "user-1".into(),
                locked_at
            }
        );

        let err = locks.require(&id, &technician()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let (h, id) = setup().await;
        let locks = h.engine.locks();
        locks.acquire(&id, &dispatcher()).await.unwrap();

        h.clock.advance(Duration::seconds(301));
        let outcome = locks.acquire(&id, &technician()).await.unwrap();
        assert!(outcome.is_acquired());

        let stored = h.db.requests().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.locked_by.as_deref(), Some("tech-1"));
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let (h, id) = setup().await;
        let locks = h.engine.locks();
        locks.acquire(&id, &dispatcher()).await.unwrap();

        assert!(!locks.release(&id, &technician()).await.unwrap());
        let stored = h.db.requests().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.locked_by.as_deref(), Some("user-1"));

        assert!(locks.release(&id, &dispatcher()).await.unwrap());
        let stored = h.db.requests().get(&id).await.unwrap().unwrap();
        assert!(stored.locked_by.is_none());
        assert!(stored.locked_at.is_none());

        let names = h.events.names();
        assert_eq!(names.iter().filter(|n| *n == REQUEST_LOCKED).count(), 1);
        assert_eq!(names.iter().filter(|n| *n == REQUEST_UNLOCKED).count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let h = Harness::new().await.unwrap();
        let locks = h.engine.locks();

        let err = locks.acquire("missing", &dispatcher()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = locks.release("missing", &dispatcher()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_racing_actors_get_one_winner() {
        let (h, id) = setup().await;
        let a = h.engine.locks();
        let b = h.engine.locks();

        let (actor_a, actor_b) = (dispatcher(), technician());
        let (first, second) = tokio::join!(
            a.acquire(&id, &actor_a),
            b.acquire(&id, &actor_b)
        );
        let winners = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|o| o.is_acquired())
            .count();
        assert_eq!(winners, 1);
    }
}
