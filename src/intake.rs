//! Intake API (spec §4.J): the thin façade the HTTP layer talks to.
//! `analyze` is the single public operation; it submits through the
//! Orchestrator and hands back a Push Bus subscription already filtered to
//! the new analysis.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::Tier;
use crate::error::IntakeError;
use crate::orchestrator::Orchestrator;
use crate::push::{PushBus, PushEvent};

pub struct AnalyzeOutcome {
    pub analysis_id: Uuid,
    pub subscription: broadcast::Receiver<PushEvent>,
}

#[derive(Clone)]
pub struct IntakeApi {
    orchestrator: Arc<Orchestrator>,
    push: PushBus,
}

impl IntakeApi {
    pub fn new(orchestrator: Arc<Orchestrator>, push: PushBus) -> Self {
        Self { orchestrator, push }
    }

    /// `analyze(userId?, query) -> {analysisId, subscriptionHandle}` (spec
    /// §4.J). Errors map 1:1 onto spec §7.
    pub async fn analyze(
        &self,
        user_id: Option<Uuid>,
        tier: Tier,
        query: &str,
        query_type: String,
        platform: String,
    ) -> Result<AnalyzeOutcome, IntakeError> {
        let subscription = self.push.subscribe();
        let analysis_id = self
            .orchestrator
            .submit(user_id, tier, query, query_type, platform)
            .await?;
        Ok(AnalyzeOutcome {
            analysis_id,
            subscription,
        })
    }
}
