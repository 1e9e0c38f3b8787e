//! Per-agent partial result (spec §3 AgentResult).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::analysis::Status;

/// The closed set of signal analyzers, plus the synthetic `aggregator`
/// pseudo-agent that records the reduction step itself (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Bot,
    Trend,
    Review,
    Promotion,
    Aggregator,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Bot => "bot",
            AgentType::Trend => "trend",
            AgentType::Review => "review",
            AgentType::Promotion => "promotion",
            AgentType::Aggregator => "aggregator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bot" => Some(AgentType::Bot),
            "trend" => Some(AgentType::Trend),
            "review" => Some(AgentType::Review),
            "promotion" => Some(AgentType::Promotion),
            "aggregator" => Some(AgentType::Aggregator),
            _ => None,
        }
    }

    /// The four analyzer types fanned out to at submit time (excludes the
    /// synthetic `aggregator` entry).
    pub const ANALYZERS: [AgentType; 4] = [
        AgentType::Bot,
        AgentType::Trend,
        AgentType::Review,
        AgentType::Promotion,
    ];
}

/// One agent's contribution to an analysis. Identity is `(analysis_id,
/// agent_type)`, unique (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub analysis_id: Uuid,
    pub agent_type: AgentType,
    pub score: f64,
    pub confidence: f64,
    pub status: Status,
    pub evidence: Value,
    pub processing_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentResult {
    /// A freshly fanned-out, not-yet-answered agent slot.
    pub fn pending(analysis_id: Uuid, agent_type: AgentType) -> Self {
        Self {
            analysis_id,
            agent_type,
            score: 0.0,
            confidence: 0.0,
            status: Status::Pending,
            evidence: Value::Null,
            processing_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
