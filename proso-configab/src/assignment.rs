//! Assignment of experiment setups to users

use crate::models::ExperimentSetup;
use proso_common::config::{Overrides, Settings};
use proso_common::random::roulette;
use proso_common::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Settings key naming the strategy
pub const STRATEGY_KEY: &str = "assignment_strategy";

/// Picks one setup for each experiment a user is not assigned to yet
pub trait AssignmentStrategy: Send + Sync {
    fn assign_setups(
        &self,
        setups_by_experiment: &BTreeMap<i64, Vec<ExperimentSetup>>,
    ) -> Result<Vec<ExperimentSetup>>;
}

/// Roulette-wheel choice weighted by setup probability
pub struct RandomStrategy {
    rng: Mutex<StdRng>,
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible choices
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentStrategy for RandomStrategy {
    fn assign_setups(
        &self,
        setups_by_experiment: &BTreeMap<i64, Vec<ExperimentSetup>>,
    ) -> Result<Vec<ExperimentSetup>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Internal("Random strategy lock poisoned".to_string()))?;

        let mut result = Vec::with_capacity(setups_by_experiment.len());
        for (experiment_id, setups) in setups_by_experiment {
            // Zero-weight setups are never drawn
            let weights: Vec<(usize, f64)> = setups
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.weight()))
                .filter(|(_, weight)| *weight > 0.0)
                .collect();
            if weights.is_empty() {
                if !setups.is_empty() {
                    warn!(
                        "Experiment {} has no setup with positive probability, nobody is assigned",
                        experiment_id
                    );
                }
                continue;
            }
            let chosen = roulette(&weights, 1, &mut *rng)?;
            result.extend(chosen.into_iter().map(|i| setups[i].clone()));
        }
        Ok(result)
    }
}

/// Strategy named by `proso_configab.assignment_strategy`, random by default
pub fn strategy_from_settings(settings: &Settings) -> Result<Arc<dyn AssignmentStrategy>> {
    let name = settings.get(crate::APP_NAME, STRATEGY_KEY, &Overrides::new())?;
    match name.as_ref().and_then(|v| v.as_str()) {
        None | Some("random") => Ok(Arc::new(RandomStrategy::new())),
        Some(other) => Err(Error::Config(format!(
            "Unknown assignment strategy '{}'",
            other
        ))),
    }
}
