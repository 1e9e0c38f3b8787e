//! Analysis repository, including the conditional status-transition update
//! central to spec §4.F / §8 invariant 1.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::{Analysis, Band, FailureReason, Status};
use crate::error::StoreError;

use super::Store;

fn row_to_analysis(row: &Row) -> rusqlite::Result<Analysis> {
    let id: String = row.get("id")?;
    let user_id: Option<String> = row.get("user_id")?;
    let status: String = row.get("status")?;
    let band: Option<String> = row.get("band")?;
    let failure_reason: Option<String> = row.get("failure_reason")?;

    Ok(Analysis {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: user_id.and_then(|s| Uuid::parse_str(&s).ok()),
        query: row.get("query")?,
        query_type: row.get("query_type")?,
        platform: row.get("platform")?,
        status: Status::from_str(&status).unwrap_or(Status::Pending),
        bot: row.get("bot")?,
        trend: row.get("trend")?,
        review: row.get("review")?,
        promotion: row.get("promotion")?,
        authenticity: row.get("authenticity")?,
        band: band.and_then(|b| Band::from_str(&b)),
        correlation_id: row.get("correlation_id")?,
        failure_reason: failure_reason.and_then(|r| match r.as_str() {
            "broker-unavailable" => Some(FailureReason::BrokerUnavailable),
            "no-agents" => Some(FailureReason::NoAgents),
            "cancelled" => Some(FailureReason::Cancelled),
            "shutdown" => Some(FailureReason::Shutdown),
            _ => None,
        }),
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        processing_ms: row.get("processing_ms")?,
    })
}

impl Store {
    pub async fn create_analysis(&self, analysis: Analysis) -> Result<Analysis, StoreError> {
        self.run_blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO analyses (id, user_id, query, query_type, platform, status, correlation_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    analysis.id.to_string(),
                    analysis.user_id.map(|u| u.to_string()),
                    analysis.query,
                    analysis.query_type,
                    analysis.platform,
                    analysis.status.as_str(),
                    analysis.correlation_id,
                    analysis.created_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(analysis),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::DuplicateCorrelation)
                }
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await
    }

    pub async fn find_analysis(&self, id: Uuid) -> Result<Option<Analysis>, StoreError> {
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM analyses WHERE id = ?1",
                params![id.to_string()],
                row_to_analysis,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn find_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Analysis>, StoreError> {
        let correlation_id = correlation_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM analyses WHERE correlation_id = ?1",
                params![correlation_id],
                row_to_analysis,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Conditionally move `id` from one of `from_set` to `to`, per spec
    /// §4.F / §4.C `updateAnalysisStatus(fromSet, to)`. Returns
    /// `StoreError::IllegalTransition` if the row's current status isn't in
    /// `from_set` — callers treat this as "someone else already finalized
    /// it" and no-op, preserving the "exactly one terminal write" invariant.
    pub async fn update_status(
        &self,
        id: Uuid,
        from_set: &'static [Status],
        to: Status,
    ) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let current: String = tx.query_row(
                "SELECT status FROM analyses WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            let current = Status::from_str(&current).unwrap_or(Status::Pending);
            if !from_set.contains(&current) {
                return Err(StoreError::IllegalTransition);
            }

            let now = Utc::now();
            match to {
                Status::Processing => {
                    tx.execute(
                        "UPDATE analyses SET status = ?1, started_at = ?2 WHERE id = ?3",
                        params![to.as_str(), now, id.to_string()],
                    )?;
                }
                Status::Failed | Status::Timeout => {
                    tx.execute(
                        "UPDATE analyses SET status = ?1, completed_at = ?2 WHERE id = ?3",
                        params![to.as_str(), now, id.to_string()],
                    )?;
                }
                _ => {
                    tx.execute(
                        "UPDATE analyses SET status = ?1 WHERE id = ?2",
                        params![to.as_str(), id.to_string()],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Record the final score, band, and failure reason together with the
    /// COMPLETE/FAILED transition, in a single transaction (spec §4.E, §4.F
    /// step 8).
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_analysis(
        &self,
        id: Uuid,
        bot: f64,
        trend: f64,
        review: f64,
        promotion: f64,
        authenticity: u8,
        band: Band,
        processing_ms: i64,
    ) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let current: String = tx.query_row(
                "SELECT status FROM analyses WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            let current = Status::from_str(&current).unwrap_or(Status::Pending);
            if current != Status::Processing {
                return Err(StoreError::IllegalTransition);
            }

            let now = Utc::now();
            tx.execute(
                "UPDATE analyses SET status = ?1, bot = ?2, trend = ?3, review = ?4, promotion = ?5,
                 authenticity = ?6, band = ?7, completed_at = ?8, processing_ms = ?9 WHERE id = ?10",
                params![
                    Status::Complete.as_str(),
                    bot,
                    trend,
                    review,
                    promotion,
                    authenticity as i64,
                    band.as_str(),
                    now,
                    processing_ms,
                    id.to_string(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn fail_analysis(
        &self,
        id: Uuid,
        reason: FailureReason,
    ) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let current: String = tx.query_row(
                "SELECT status FROM analyses WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            let current = Status::from_str(&current).unwrap_or(Status::Pending);
            if current.is_terminal() {
                return Err(StoreError::IllegalTransition);
            }
            let now = Utc::now();
            tx.execute(
                "UPDATE analyses SET status = ?1, failure_reason = ?2, completed_at = ?3 WHERE id = ?4",
                params![Status::Failed.as_str(), reason.as_str(), now, id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Public feed of completed analyses, newest first (spec §4.J).
    pub async fn list_public_analyses(&self, limit: u32) -> Result<Vec<Analysis>, StoreError> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM analyses WHERE status = 'COMPLETE' ORDER BY completed_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], row_to_analysis)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
