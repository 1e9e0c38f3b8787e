//! Topic Router (spec §4.A): deterministic string grammar for broker topics,
//! correlation id derivation, and strict parsing. Pure — no I/O.

use uuid::Uuid;

use crate::domain::AgentType;

/// A topic the Topic Router knows how to format and parse. Unknown shapes
/// are represented by `Unknown` so callers can log-and-discard per spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    AnalysisRequest { user_id: String, analysis_id: Uuid },
    AgentRequest { agent_type: AgentType },
    AgentResponse { agent_type: AgentType },
    ScoreUpdate { analysis_id: Uuid },
    StatusUpdate { analysis_id: Uuid },
    ShameAdd,
}

const PREFIX: &str = "signalzero";

impl Topic {
    /// Render the spec-literal `/`-delimited topic string (spec §4.A).
    pub fn render(&self) -> String {
        match self {
            Topic::AnalysisRequest {
                user_id,
                analysis_id,
            } => format!("{PREFIX}/analysis/request/{user_id}/{analysis_id}"),
            Topic::AgentRequest { agent_type } => {
                format!("{PREFIX}/agent/{}/request", agent_type.as_str())
            }
            Topic::AgentResponse { agent_type } => {
                format!("{PREFIX}/agent/{}/response", agent_type.as_str())
            }
            Topic::ScoreUpdate { analysis_id } => {
                format!("{PREFIX}/updates/score/{analysis_id}")
            }
            Topic::StatusUpdate { analysis_id } => {
                format!("{PREFIX}/updates/status/{analysis_id}")
            }
            Topic::ShameAdd => format!("{PREFIX}/dashboard/shame/add"),
        }
    }

    /// The subscription pattern for all agent responses: `signalzero/agent/+/response`.
    pub fn agent_response_pattern() -> String {
        format!("{PREFIX}/agent/+/response")
    }

    /// Strictly parse a topic string. Returns `None` for anything that
    /// doesn't match a known pattern; callers log and discard per spec §4.A.
    pub fn parse(topic: &str) -> Option<Topic> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.first() != Some(&PREFIX) {
            return None;
        }
        match parts.as_slice() {
            [_, "analysis", "request", user_id, analysis_id] => {
                let analysis_id = Uuid::parse_str(analysis_id).ok()?;
                Some(Topic::AnalysisRequest {
                    user_id: user_id.to_string(),
                    analysis_id,
                })
            }
            [_, "agent", agent, "request"] => {
                AgentType::from_str(agent).map(|agent_type| Topic::AgentRequest { agent_type })
            }
            [_, "agent", agent, "response"] => {
                AgentType::from_str(agent).map(|agent_type| Topic::AgentResponse { agent_type })
            }
            [_, "updates", "score", analysis_id] => {
                Uuid::parse_str(analysis_id)
                    .ok()
                    .map(|analysis_id| Topic::ScoreUpdate { analysis_id })
            }
            [_, "updates", "status", analysis_id] => {
                Uuid::parse_str(analysis_id)
                    .ok()
                    .map(|analysis_id| Topic::StatusUpdate { analysis_id })
            }
            [_, "dashboard", "shame", "add"] => Some(Topic::ShameAdd),
            _ => None,
        }
    }

    /// Convert the spec-literal `/`-grammar to an `async-nats` subject
    /// (`.`-delimited, `*` single-level wildcard). Only used at the
    /// `NatsBroker` boundary; the grammar itself stays as spec.md defines it
    /// (see DESIGN.md's Open Question resolution).
    pub fn to_subject(topic_str: &str) -> String {
        topic_str.replace('/', ".").replace('+', "*")
    }
}

/// Correlation id for an analysis: the `analysisId`, stringified (spec
/// §4.A, GLOSSARY).
pub fn correlation_id(analysis_id: Uuid) -> String {
    analysis_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_topics() {
        let id = Uuid::new_v4();
        assert_eq!(
            Topic::AgentRequest {
                agent_type: AgentType::Bot
            }
            .render(),
            "signalzero/agent/bot/request"
        );
        assert_eq!(
            Topic::ScoreUpdate { analysis_id: id }.render(),
            format!("signalzero/updates/score/{id}")
        );
    }

    #[test]
    fn round_trips_agent_response() {
        let rendered = Topic::AgentResponse {
            agent_type: AgentType::Review,
        }
        .render();
        assert_eq!(
            Topic::parse(&rendered),
            Some(Topic::AgentResponse {
                agent_type: AgentType::Review
            })
        );
    }

    #[test]
    fn rejects_unknown_agent_type() {
        assert_eq!(Topic::parse("signalzero/agent/sentiment/request"), None);
    }

    #[test]
    fn rejects_foreign_prefix() {
        assert_eq!(Topic::parse("otherapp/agent/bot/request"), None);
    }

    #[test]
    fn rejects_malformed_uuid() {
        assert_eq!(
            Topic::parse("signalzero/updates/score/not-a-uuid"),
            None
        );
    }

    #[test]
    fn converts_to_nats_subject() {
        assert_eq!(
            Topic::to_subject("signalzero/agent/+/response"),
            "signalzero.agent.*.response"
        );
    }
}
