//! Agent result repository (spec §3 AgentResult, §4.C `upsertAgentResult`,
//! `countCompletedAgents`).

use rusqlite::{params, Row};
use uuid::Uuid;

use crate::domain::{AgentResult, AgentType, Status};
use crate::error::StoreError;

use super::Store;

fn row_to_agent_result(row: &Row) -> rusqlite::Result<AgentResult> {
    let analysis_id: String = row.get("analysis_id")?;
    let agent_type: String = row.get("agent_type")?;
    let status: String = row.get("status")?;
    let evidence: String = row.get("evidence")?;
    Ok(AgentResult {
        analysis_id: Uuid::parse_str(&analysis_id).unwrap_or_default(),
        agent_type: AgentType::from_str(&agent_type).unwrap_or(AgentType::Bot),
        score: row.get("score")?,
        confidence: row.get("confidence")?,
        status: Status::from_str(&status).unwrap_or(Status::Pending),
        evidence: serde_json::from_str(&evidence).unwrap_or(serde_json::Value::Null),
        processing_ms: row.get("processing_ms")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    })
}

impl Store {
    /// Seed the four pending agent-result rows for a freshly submitted
    /// analysis (spec §4.F step 4).
    pub async fn seed_agent_results(&self, analysis_id: Uuid) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for agent_type in AgentType::ANALYZERS {
                let pending = AgentResult::pending(analysis_id, agent_type);
                tx.execute(
                    "INSERT INTO agent_results (analysis_id, agent_type, score, confidence, status, evidence, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        analysis_id.to_string(),
                        agent_type.as_str(),
                        pending.score,
                        pending.confidence,
                        pending.status.as_str(),
                        pending.evidence.to_string(),
                        pending.created_at,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Record a completed agent's contribution (spec §4.C
    /// `upsertAgentResult`). Only applies to a row still PENDING — a second
    /// response for the same `(analysis_id, agent_type)` is dropped as a
    /// late/duplicate response by the caller before this is reached.
    pub async fn upsert_agent_result(&self, result: AgentResult) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE agent_results SET score = ?1, confidence = ?2, status = ?3, evidence = ?4,
                 processing_ms = ?5, completed_at = ?6
                 WHERE analysis_id = ?7 AND agent_type = ?8 AND status = 'PENDING'",
                params![
                    result.score,
                    result.confidence,
                    result.status.as_str(),
                    result.evidence.to_string(),
                    result.processing_ms,
                    result.completed_at,
                    result.analysis_id.to_string(),
                    result.agent_type.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Record the synthetic `aggregator` pseudo-agent's reduction step
    /// itself (spec §4.F finalize step c). Unlike the four analyzer rows,
    /// this one is inserted fresh (there's no PENDING placeholder for it).
    pub async fn insert_aggregator_result(&self, result: AgentResult) -> Result<(), StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO agent_results (analysis_id, agent_type, score, confidence, status, evidence, processing_ms, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(analysis_id, agent_type) DO UPDATE SET
                    score = excluded.score, confidence = excluded.confidence, status = excluded.status,
                    evidence = excluded.evidence, processing_ms = excluded.processing_ms, completed_at = excluded.completed_at",
                params![
                    result.analysis_id.to_string(),
                    result.agent_type.as_str(),
                    result.score,
                    result.confidence,
                    result.status.as_str(),
                    result.evidence.to_string(),
                    result.processing_ms,
                    result.created_at,
                    result.completed_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_agent_results(&self, analysis_id: Uuid) -> Result<Vec<AgentResult>, StoreError> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM agent_results WHERE analysis_id = ?1 ORDER BY agent_type",
            )?;
            let rows = stmt
                .query_map(params![analysis_id.to_string()], row_to_agent_result)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn count_completed_agents(&self, analysis_id: Uuid) -> Result<u32, StoreError> {
        self.run_blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM agent_results WHERE analysis_id = ?1 AND status = 'COMPLETE'",
                params![analysis_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
        .await
    }
}
