//! User repository.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::{Tier, User};
use crate::error::StoreError;

use super::Store;

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let id: String = row.get("id")?;
    let tier: String = row.get("tier")?;
    Ok(User {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        tier: Tier::from_str(&tier).unwrap_or(Tier::Public),
        used_this_month: row.get("used_this_month")?,
        last_reset: row.get("last_reset")?,
        active: row.get::<_, i64>("active")? != 0,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    pub async fn create_user(&self, user: User) -> Result<User, StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, tier, used_this_month, last_reset, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_hash,
                    user.tier.as_str(),
                    user.used_this_month,
                    user.last_reset,
                    user.active as i64,
                    user.created_at,
                ],
            )?;
            Ok(user)
        })
        .await
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Outcome of an atomic check-and-increment (spec §4.D step 4: "If
    /// usedThisMonth < limit -> usedThisMonth += 1 ... Else -> Denied").
    pub async fn reserve_usage(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Option<bool>, StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let row: Option<(i64, u32, DateTime<Utc>)> = tx
                .query_row(
                    "SELECT active, used_this_month, last_reset FROM users WHERE id = ?1",
                    params![user_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((active, used, last_reset)) = row else {
                return Ok(None);
            };
            if active == 0 {
                return Ok(Some(false));
            }

            let same_month = last_reset.year() == now.year() && last_reset.month() == now.month();
            let used = if same_month { used } else { 0 };
            let reset = if same_month { last_reset } else { now };

            let granted = match limit {
                None => true,
                Some(limit) => used < limit,
            };

            if granted {
                tx.execute(
                    "UPDATE users SET used_this_month = ?1, last_reset = ?2 WHERE id = ?3",
                    params![used + 1, reset, user_id.to_string()],
                )?;
            } else if !same_month {
                // Persist the month-boundary reset even on denial, per
                // "resetUsageIfMonthChanged" running on first observation
                // after the boundary regardless of outcome.
                tx.execute(
                    "UPDATE users SET used_this_month = ?1, last_reset = ?2 WHERE id = ?3",
                    params![used, reset, user_id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(Some(granted))
        })
        .await
    }

    /// Refund one unit of usage (spec §4.D "release"), used only when an
    /// analysis never leaves PENDING. Floors at zero; never goes negative.
    pub async fn release_usage(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE users SET used_this_month = MAX(0, used_this_month - 1) WHERE id = ?1",
                params![user_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE users SET active = 0 WHERE id = ?1",
                params![user_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}
