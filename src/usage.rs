//! Usage Meter (spec §4.D): per-tier monthly quota enforcement, gating
//! submission at the Intake API boundary.

use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::config::UsageLimits;
use crate::domain::Tier;
use crate::error::StoreError;
use crate::store::Store;

/// Outcome of a quota check (spec §4.D `reserve`).
pub enum Reservation {
    Granted,
    Denied { remaining: u32, reset_at: chrono::DateTime<chrono::Utc> },
}

pub struct UsageMeter {
    store: Store,
    limits: UsageLimits,
}

impl UsageMeter {
    pub fn new(store: Store, limits: UsageLimits) -> Self {
        Self { store, limits }
    }

    /// Reserve one unit of quota for `user_id`'s tier. Unauthenticated
    /// callers (`user_id = None`) are always charged against the PUBLIC
    /// tier's limit, which defaults to 0 — i.e. denied (spec §4.D, §8
    /// scenario S4).
    pub async fn reserve(
        &self,
        user_id: Option<Uuid>,
        tier: Tier,
    ) -> Result<Reservation, StoreError> {
        let limit = self.limits.for_tier(tier);
        if limit.is_none() {
            return Ok(Reservation::Granted); // unbounded tier
        }

        let Some(user_id) = user_id else {
            return Ok(if limit.unwrap() > 0 {
                Reservation::Granted
            } else {
                Reservation::Denied {
                    remaining: 0,
                    reset_at: next_month_boundary(Utc::now()),
                }
            });
        };

        let now = Utc::now();
        // Atomic check-and-increment under the row (spec §4.D: "under a
        // per-user lock (may be a row-level DB lock)") — avoids a
        // check-then-write race between concurrent reserve() calls for the
        // same user near the quota boundary.
        match self.store.reserve_usage(user_id, now, limit).await? {
            None => Ok(Reservation::Denied {
                remaining: 0,
                reset_at: next_month_boundary(now),
            }),
            Some(true) => Ok(Reservation::Granted),
            Some(false) => Ok(Reservation::Denied {
                remaining: 0,
                reset_at: next_month_boundary(now),
            }),
        }
    }

    /// `release(userId)` (spec §4.D): refund one unit of quota. The
    /// Orchestrator calls this only when an analysis never leaves PENDING —
    /// e.g. `createAnalysis` itself fails — so the reservation never turns
    /// into real agent work.
    pub async fn release(&self, user_id: Option<Uuid>) -> Result<(), StoreError> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        self.store.release_usage(user_id).await
    }
}

fn next_month_boundary(now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;

    #[tokio::test]
    async fn public_tier_is_denied_by_default() {
        let store = Store::open_in_memory().unwrap();
        let meter = UsageMeter::new(store, UsageLimits::default());
        let res = meter.reserve(None, Tier::Public).await.unwrap();
        assert!(matches!(res, Reservation::Denied { .. }));
    }

    #[tokio::test]
    async fn free_tier_grants_up_to_limit() {
        let store = Store::open_in_memory().unwrap();
        let user = User::new("alice".into(), "hash".into(), Tier::Free);
        let user = store.create_user(user).await.unwrap();
        let meter = UsageMeter::new(store, UsageLimits::default());

        for _ in 0..3 {
            let res = meter.reserve(Some(user.id), Tier::Free).await.unwrap();
            assert!(matches!(res, Reservation::Granted));
        }
        let res = meter.reserve(Some(user.id), Tier::Free).await.unwrap();
        assert!(matches!(res, Reservation::Denied { .. }));
    }

    #[tokio::test]
    async fn enterprise_tier_is_unbounded() {
        let store = Store::open_in_memory().unwrap();
        let user = User::new("biz".into(), "hash".into(), Tier::Enterprise);
        let user = store.create_user(user).await.unwrap();
        let meter = UsageMeter::new(store, UsageLimits::default());
        for _ in 0..50 {
            let res = meter.reserve(Some(user.id), Tier::Enterprise).await.unwrap();
            assert!(matches!(res, Reservation::Granted));
        }
    }
}
