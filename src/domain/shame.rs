//! Shame List entry: derived projection over completed analyses meeting a
//! manipulation threshold (spec §3, §4.I).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::Band;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShameEntry {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub product_name: String,
    pub band: Band,
    pub bot: f64,
    pub authenticity: f64,
    pub active: bool,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

/// Whether a completed analysis meets the shame-list criteria (spec §4.F.e):
/// `bot >= 60 OR authenticity <= 33`.
pub fn meets_shame_criteria(bot: f64, authenticity: f64) -> bool {
    bot >= 60.0 || authenticity <= 33.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_on_bot() {
        assert!(meets_shame_criteria(60.0, 90.0));
        assert!(!meets_shame_criteria(59.9, 90.0));
    }

    #[test]
    fn criteria_on_authenticity() {
        assert!(meets_shame_criteria(0.0, 33.0));
        assert!(!meets_shame_criteria(0.0, 34.0));
    }
}
