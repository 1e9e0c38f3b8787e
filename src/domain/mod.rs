//! Core entities: User, Analysis, AgentResult, ShameEntry (spec §3).

pub mod agent_result;
pub mod analysis;
pub mod shame;
pub mod user;

pub use agent_result::{AgentResult, AgentType};
pub use analysis::{normalize_query, Analysis, Band, FailureReason, Status};
pub use shame::{meets_shame_criteria, ShameEntry};
pub use user::{Tier, User, UserResponse};
