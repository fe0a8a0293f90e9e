//! Per-setup answer statistics

use crate::experiments::ExperimentStore;
use async_trait::async_trait;
use proso_common::db::push_ids;
use proso_common::metric::{binomial_confidence_mean, confidence_median, DEFAULT_Z};
use proso_common::Result;
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use tracing::debug;

/// Batched source of experiment setup statistics
///
/// The result must hold an entry for every requested id.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn setup_stats(&self, setup_ids: &[i64], answers_per_user: i64) -> Result<HashMap<i64, Value>>;
}

impl ExperimentStore {
    /// Aggregate answers of the given setups with one query
    ///
    /// Only users with more than `answers_per_user` answers within a setup are
    /// counted. Setups without such users get `number_of_users: 0` and null
    /// metrics.
    pub async fn get_stats(&self, setup_ids: &[i64], answers_per_user: i64) -> Result<HashMap<i64, Value>> {
        // (number of answers, number of sessions) per qualifying user
        let mut fetched: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();

        if !setup_ids.is_empty() {
            let mut query = QueryBuilder::<Sqlite>::new(
                r#"
                SELECT
                    aes.experiment_setup_id,
                    a.user_id,
                    COUNT(a.id) AS number_of_answers,
                    COUNT(DISTINCT a.session_id) AS number_of_sessions
                FROM answer a
                INNER JOIN configab_answer_experiment_setup aes ON aes.answer_id = a.id
                WHERE aes.experiment_setup_id IN (
                "#,
            );
            push_ids(&mut query, setup_ids);
            query.push(") GROUP BY aes.experiment_setup_id, a.user_id HAVING COUNT(a.id) > ");
            query.push_bind(answers_per_user);

            let rows: Vec<(i64, i64, i64, i64)> = query.build_query_as().fetch_all(&self.db).await?;
            debug!(
                "Stats of {} setups aggregated from {} user rows",
                setup_ids.len(),
                rows.len()
            );
            for (setup_id, _user_id, answers, sessions) in rows {
                fetched.entry(setup_id).or_default().push((answers, sessions));
            }
        }

        Ok(setup_ids
            .iter()
            .map(|id| {
                let stats = match fetched.get(id) {
                    Some(users) => {
                        let answers: Vec<f64> = users.iter().map(|(a, _)| *a as f64).collect();
                        let returning: Vec<bool> = users.iter().map(|(_, s)| *s > 1).collect();
                        json!({
                            "number_of_users": users.len(),
                            "number_of_answers": confidence_median(&answers, DEFAULT_Z),
                            "returning_chance": binomial_confidence_mean(&returning, DEFAULT_Z),
                        })
                    }
                    None => json!({
                        "number_of_users": 0,
                        "number_of_answers": null,
                        "returning_chance": null,
                    }),
                };
                (*id, stats)
            })
            .collect())
    }
}

#[async_trait]
impl StatsSource for ExperimentStore {
    async fn setup_stats(&self, setup_ids: &[i64], answers_per_user: i64) -> Result<HashMap<i64, Value>> {
        self.get_stats(setup_ids, answers_per_user).await
    }
}
