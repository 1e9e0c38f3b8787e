//! The Analysis record: one query's lifecycle from submission to verdict
//! (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotone lifecycle status (spec §3, §8 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pending,
    Processing,
    Complete,
    Failed,
    Timeout,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Processing => "PROCESSING",
            Status::Complete => "COMPLETE",
            Status::Failed => "FAILED",
            Status::Timeout => "TIMEOUT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Status::Pending),
            "PROCESSING" => Some(Status::Processing),
            "COMPLETE" => Some(Status::Complete),
            "FAILED" => Some(Status::Failed),
            "TIMEOUT" => Some(Status::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Failed | Status::Timeout)
    }

    /// True if `self -> to` is one of the monotone transitions allowed by
    /// spec §3 ("PENDING->PROCESSING->{COMPLETE|FAILED|TIMEOUT}").
    pub fn can_transition_to(&self, to: Status) -> bool {
        matches!(
            (self, to),
            (Status::Pending, Status::Processing)
                | (Status::Pending, Status::Failed)
                | (Status::Processing, Status::Complete)
                | (Status::Processing, Status::Failed)
                | (Status::Processing, Status::Timeout)
        )
    }
}

/// Classification band derived from `authenticity` (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Green,
    Yellow,
    Red,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Green => "GREEN",
            Band::Yellow => "YELLOW",
            Band::Red => "RED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GREEN" => Some(Band::Green),
            "YELLOW" => Some(Band::Yellow),
            "RED" => Some(Band::Red),
            _ => None,
        }
    }

    /// Classify an authenticity score in `[0,100]` per spec §4.E:
    /// `>=67 -> GREEN`, `34..=66 -> YELLOW`, `<=33 -> RED`.
    pub fn classify(authenticity: u8) -> Band {
        if authenticity >= 67 {
            Band::Green
        } else if authenticity <= 33 {
            Band::Red
        } else {
            Band::Yellow
        }
    }
}

/// A terminal-state reason, surfaced on FAILED/TIMEOUT analyses (spec §7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    BrokerUnavailable,
    NoAgents,
    Cancelled,
    Shutdown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::BrokerUnavailable => "broker-unavailable",
            FailureReason::NoAgents => "no-agents",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Shutdown => "shutdown",
        }
    }

    pub fn human_message(&self) -> &'static str {
        match self {
            FailureReason::BrokerUnavailable => {
                "Analysis could not reach any detection agent; try again shortly."
            }
            FailureReason::NoAgents => "No detection agents responded in time.",
            FailureReason::Cancelled => "Analysis was cancelled.",
            FailureReason::Shutdown => "Service shut down before analysis completed.",
        }
    }
}

/// One request/response lifecycle carrying a query from submission to a
/// scored verdict (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub query: String,
    pub query_type: String,
    pub platform: String,
    pub status: Status,
    pub bot: Option<f64>,
    pub trend: Option<f64>,
    pub review: Option<f64>,
    pub promotion: Option<f64>,
    pub authenticity: Option<f64>,
    pub band: Option<Band>,
    pub correlation_id: String,
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_ms: Option<i64>,
}

impl Analysis {
    /// Build a fresh PENDING analysis. `correlation_id` equals the analysis
    /// id, stringified, per spec §4.F step 3 / GLOSSARY.
    pub fn new(
        user_id: Option<Uuid>,
        query: String,
        query_type: String,
        platform: String,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            user_id,
            query,
            query_type,
            platform,
            status: Status::Pending,
            bot: None,
            trend: None,
            review: None,
            promotion: None,
            authenticity: None,
            band: None,
            correlation_id: id.to_string(),
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_ms: None,
        }
    }
}

/// Normalize a raw query string per spec §4.F step 1: trim, reject empty,
/// truncate to 2KB.
pub fn normalize_query(raw: &str) -> Result<String, &'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("query must not be empty");
    }
    const MAX_BYTES: usize = 2048;
    if trimmed.len() <= MAX_BYTES {
        return Ok(trimmed.to_string());
    }
    let mut end = MAX_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    Ok(trimmed[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(Band::classify(67), Band::Green);
        assert_eq!(Band::classify(100), Band::Green);
        assert_eq!(Band::classify(66), Band::Yellow);
        assert_eq!(Band::classify(34), Band::Yellow);
        assert_eq!(Band::classify(33), Band::Red);
        assert_eq!(Band::classify(0), Band::Red);
    }

    #[test]
    fn status_transitions_are_monotone() {
        assert!(Status::Pending.can_transition_to(Status::Processing));
        assert!(Status::Processing.can_transition_to(Status::Complete));
        assert!(!Status::Complete.can_transition_to(Status::Processing));
        assert!(!Status::Pending.can_transition_to(Status::Complete));
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_query("   ").is_err());
    }

    #[test]
    fn normalize_trims_and_truncates() {
        assert_eq!(normalize_query("  Stanley Cup  ").unwrap(), "Stanley Cup");
        let long = "a".repeat(3000);
        let normalized = normalize_query(&long).unwrap();
        assert_eq!(normalized.len(), 2048);
    }
}
