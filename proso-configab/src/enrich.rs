//! Enricher attaching answer statistics to experiment setups

use crate::models::EXPERIMENT_SETUP_TYPE;
use crate::stats::StatsSource;
use async_trait::async_trait;
use proso_common::enrichment::EnrichedObject;
use proso_common::{Enricher, Error, RequestContext, Result};
use std::sync::Arc;
use tracing::error;

/// Query parameter bounding the answers per user
pub const ANSWERS_PER_USER_PARAM: &str = "answers_per_user";
pub const DEFAULT_ANSWERS_PER_USER: i64 = 10;
/// Presence of this query parameter turns the enricher off
pub const SKIP_STATS_PARAM: &str = "stats";

/// Sets `stats` of every experiment setup from one batched lookup
pub struct ExperimentSetupStats {
    source: Arc<dyn StatsSource>,
}

impl ExperimentSetupStats {
    /// Object types the enricher is registered for
    pub const OBJECT_TYPES: &'static [&'static str] = &[EXPERIMENT_SETUP_TYPE];

    pub fn new(source: Arc<dyn StatsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Enricher for ExperimentSetupStats {
    fn name(&self) -> &str {
        "experiment_setup_stats"
    }

    async fn enrich(
        &self,
        ctx: &RequestContext,
        objects: &mut [&mut EnrichedObject],
        _nested: bool,
    ) -> Result<()> {
        if ctx.param(SKIP_STATS_PARAM).is_some() {
            return Ok(());
        }
        let answers_per_user = ctx.param_i64(ANSWERS_PER_USER_PARAM, DEFAULT_ANSWERS_PER_USER)?;
        let ids: Vec<i64> = objects.iter().map(|o| o.id()).collect();
        let stats = self.source.setup_stats(&ids, answers_per_user).await?;

        // A missing id is a broken source; fail before touching any object
        if let Some(missing) = ids.iter().find(|id| !stats.contains_key(*id)) {
            error!("Stats source returned no entry for experiment setup {}", missing);
            return Err(Error::Internal(format!(
                "There are no stats for experiment setup {}",
                missing
            )));
        }

        for object in objects.iter_mut() {
            if let Some(value) = stats.get(&object.id()) {
                object.set_extra("stats", value.clone());
            }
        }
        Ok(())
    }
}
