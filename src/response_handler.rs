//! Response Handler (spec §4.G): consumes inbound agent responses off
//! `signalzero/agent/+/response` and folds them into the store. Never
//! mutates `Analysis.status` — that is the Orchestrator's exclusive
//! responsibility (spec §8 invariant 2).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::broker::{Broker, BrokerMessage};
use crate::domain::{AgentResult, AgentType, Status};
use crate::error::ResponseHandlerError;
use crate::orchestrator::Orchestrator;
use crate::store::Store;
use crate::topics::Topic;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentResponsePayload {
    agent_type: String,
    analysis_id: Uuid,
    score: f64,
    confidence: f64,
    evidence: serde_json::Value,
    status: String,
    processing_ms: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    produced_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Clone)]
pub struct ResponseHandler {
    store: Store,
    orchestrator: Arc<Orchestrator>,
    handler_budget: Duration,
}

impl ResponseHandler {
    pub fn new(store: Store, orchestrator: Arc<Orchestrator>, handler_budget: Duration) -> Self {
        Self {
            store,
            orchestrator,
            handler_budget,
        }
    }

    /// Subscribe to all agent responses and process them until the broker
    /// channel closes (broker shutdown).
    ///
    /// Each message is handled on its own task rather than inline, bounded
    /// by `handlerBudget` (spec §4.B: "subscribe handlers... must not block
    /// longer than a configurable handlerBudget; longer work is handed to
    /// the Orchestrator's worker pool"). If a handler is still running past
    /// the budget, this loop stops waiting on it and moves on to the next
    /// message instead of stalling the whole subscription.
    pub async fn run(self, broker: Arc<dyn Broker>) {
        let pattern = Topic::agent_response_pattern();
        let mut rx = match broker.subscribe(&pattern).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(%e, "response handler: failed to subscribe to agent responses");
                return;
            }
        };
        while let Some(message) = rx.recv().await {
            let this = self.clone();
            let task = tokio::spawn(async move { this.handle_one(message).await });
            match tokio::time::timeout(self.handler_budget, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::debug!(%e, "response handler: dropped message"),
                Ok(Err(join_err)) => {
                    tracing::warn!(%join_err, "response handler task panicked")
                }
                Err(_elapsed) => tracing::warn!(
                    budget_ms = self.handler_budget.as_millis() as u64,
                    "agent response handler exceeded handlerBudget, continuing in background"
                ),
            }
        }
    }

    async fn handle_one(&self, message: BrokerMessage) -> Result<(), ResponseHandlerError> {
        let payload: AgentResponsePayload = serde_json::from_slice(&message.payload)
            .map_err(|e| ResponseHandlerError::Malformed(e.to_string()))?;

        let agent_type = AgentType::from_str(&payload.agent_type)
            .ok_or_else(|| ResponseHandlerError::Malformed("unknown agentType".to_string()))?;
        let status = Status::from_str(&payload.status)
            .ok_or_else(|| ResponseHandlerError::Malformed("unknown status".to_string()))?;

        let analysis = self
            .store
            .find_analysis(payload.analysis_id)
            .await
            .map_err(|e| ResponseHandlerError::Malformed(e.to_string()))?;
        let Some(analysis) = analysis else {
            return Err(ResponseHandlerError::LateOrUnknown);
        };

        let result = AgentResult {
            analysis_id: payload.analysis_id,
            agent_type,
            score: payload.score,
            confidence: payload.confidence,
            status,
            evidence: payload.evidence,
            processing_ms: payload.processing_ms,
            created_at: chrono::Utc::now(),
            completed_at: Some(chrono::Utc::now()),
        };

        // A response for an already-terminal analysis is still persisted
        // for forensic value (spec §5 "recorded for forensic value only",
        // §8 S5) but must not wake the completion loop or trigger a
        // broadcast: the analysis already reached its one terminal state.
        if analysis.status.is_terminal() {
            self.store
                .upsert_agent_result(result)
                .await
                .map_err(|e| ResponseHandlerError::Malformed(e.to_string()))?;
            return Err(ResponseHandlerError::LateOrUnknown);
        }

        self.store
            .upsert_agent_result(result)
            .await
            .map_err(|e| ResponseHandlerError::Malformed(e.to_string()))?;

        // Notify regardless of whether the upsert created a new row: a
        // replayed response is idempotent at the orchestrator (spec §4.G
        // step 3).
        self.orchestrator.notify_arrived(payload.analysis_id, agent_type);

        Ok(())
    }
}
