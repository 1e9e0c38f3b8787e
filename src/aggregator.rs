//! Aggregator (spec §4.E): a pure weighted-sum reduction from four agent
//! scores to one `authenticity` score and a `Band`. No I/O, no clock.

use crate::domain::{AgentType, Band};

/// Weights applied to each agent's score, per spec §4.E:
/// `authenticity = 0.4*(100-bot) + 0.3*trend + 0.2*review + 0.1*promotion`.
const WEIGHT_BOT: f64 = 0.4;
const WEIGHT_TREND: f64 = 0.3;
const WEIGHT_REVIEW: f64 = 0.2;
const WEIGHT_PROMOTION: f64 = 0.1;

/// Neutral fallback used when an agent never responds before the
/// aggregation deadline (spec §4.E "missing inputs are imputed at a
/// neutral 50", §8 scenario S3).
const NEUTRAL_IMPUTED_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy)]
pub struct AgentScores {
    pub bot: Option<f64>,
    pub trend: Option<f64>,
    pub review: Option<f64>,
    pub promotion: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AggregateResult {
    pub bot: f64,
    pub trend: f64,
    pub review: f64,
    pub promotion: f64,
    pub authenticity: u8,
    pub band: Band,
    /// Agent types whose score was imputed rather than received.
    pub imputed: Vec<AgentType>,
}

/// Reduce four (possibly-missing) agent scores to a final verdict.
pub fn aggregate(scores: AgentScores) -> AggregateResult {
    let mut imputed = Vec::new();

    let bot = scores.bot.unwrap_or_else(|| {
        imputed.push(AgentType::Bot);
        NEUTRAL_IMPUTED_SCORE
    });
    let trend = scores.trend.unwrap_or_else(|| {
        imputed.push(AgentType::Trend);
        NEUTRAL_IMPUTED_SCORE
    });
    let review = scores.review.unwrap_or_else(|| {
        imputed.push(AgentType::Review);
        NEUTRAL_IMPUTED_SCORE
    });
    let promotion = scores.promotion.unwrap_or_else(|| {
        imputed.push(AgentType::Promotion);
        NEUTRAL_IMPUTED_SCORE
    });

    let raw = WEIGHT_BOT * (100.0 - bot)
        + WEIGHT_TREND * trend
        + WEIGHT_REVIEW * review
        + WEIGHT_PROMOTION * promotion;
    let authenticity = raw.round().clamp(0.0, 100.0) as u8;
    let band = Band::classify(authenticity);

    AggregateResult {
        bot,
        trend,
        review,
        promotion,
        authenticity,
        band,
        imputed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_present_computes_weighted_sum() {
        let result = aggregate(AgentScores {
            bot: Some(10.0),
            trend: Some(80.0),
            review: Some(90.0),
            promotion: Some(20.0),
        });
        // 0.4*(100-10) + 0.3*80 + 0.2*90 + 0.1*20 = 36 + 24 + 18 + 2 = 80
        assert_eq!(result.authenticity, 80);
        assert_eq!(result.band, Band::Green);
        assert!(result.imputed.is_empty());
    }

    #[test]
    fn missing_agents_are_imputed_neutral() {
        let result = aggregate(AgentScores {
            bot: Some(10.0),
            trend: None,
            review: None,
            promotion: None,
        });
        // 0.4*90 + 0.3*50 + 0.2*50 + 0.1*50 = 36 + 15 + 10 + 5 = 66
        assert_eq!(result.authenticity, 66);
        assert_eq!(result.band, Band::Yellow);
        assert_eq!(result.imputed.len(), 3);
    }

    #[test]
    fn high_bot_score_drives_red_band() {
        let result = aggregate(AgentScores {
            bot: Some(95.0),
            trend: Some(10.0),
            review: Some(5.0),
            promotion: Some(5.0),
        });
        assert!(result.authenticity <= 33);
        assert_eq!(result.band, Band::Red);
    }

    #[test]
    fn output_is_always_clamped() {
        let result = aggregate(AgentScores {
            bot: Some(0.0),
            trend: Some(100.0),
            review: Some(100.0),
            promotion: Some(100.0),
        });
        assert!(result.authenticity <= 100);
    }
}
