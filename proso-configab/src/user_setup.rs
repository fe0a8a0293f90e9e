//! Experiment setups of users and the overrides they imply

use crate::assignment::AssignmentStrategy;
use crate::models::{ExperimentSetup, UserSetup};
use proso_common::config::Overrides;
use proso_common::db::push_ids;
use proso_common::Result;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct UserSetupStore {
    db: SqlitePool,
}

impl UserSetupStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Variable values of the user's setups, keyed by `app_name.variable_name`
    ///
    /// Users without answers get a setup of every enabled experiment they are
    /// not part of yet; paused experiments keep their users but assign nobody
    /// new. New assignments are stored, so a user keeps the same setup.
    pub async fn variables_to_override(
        &self,
        user_id: i64,
        strategy: &dyn AssignmentStrategy,
    ) -> Result<BTreeMap<String, String>> {
        let mut tx = self.db.begin().await?;

        let mut assigned: Vec<ExperimentSetup> = sqlx::query_as(
            r#"
            SELECT s.id, s.experiment_id, s.content_hash, s.probability
            FROM configab_experiment_setup s
            INNER JOIN configab_user_setup us ON us.experiment_setup_id = s.id
            INNER JOIN configab_experiment e ON e.id = s.experiment_id
            WHERE us.user_id = ? AND e.is_enabled = 1
            ORDER BY s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        let assigned_experiments: HashSet<i64> =
            assigned.iter().filter_map(|s| s.experiment_id).collect();

        let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answer WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        if answers == 0 {
            let candidates: Vec<ExperimentSetup> = sqlx::query_as(
                r#"
                SELECT s.id, s.experiment_id, s.content_hash, s.probability
                FROM configab_experiment_setup s
                INNER JOIN configab_experiment e ON e.id = s.experiment_id
                WHERE e.is_enabled = 1 AND e.is_paused = 0
                ORDER BY s.id
                "#,
            )
            .fetch_all(&mut *tx)
            .await?;

            let mut setups_by_experiment: BTreeMap<i64, Vec<ExperimentSetup>> = BTreeMap::new();
            for setup in candidates {
                if let Some(experiment_id) = setup.experiment_id {
                    if !assigned_experiments.contains(&experiment_id) {
                        setups_by_experiment.entry(experiment_id).or_default().push(setup);
                    }
                }
            }

            let new_setups = strategy.assign_setups(&setups_by_experiment)?;
            for setup in &new_setups {
                sqlx::query(
                    "INSERT OR IGNORE INTO configab_user_setup (user_id, experiment_setup_id) VALUES (?, ?)",
                )
                .bind(user_id)
                .bind(setup.id)
                .execute(&mut *tx)
                .await?;
                info!(
                    "User {} assigned to setup {} of experiment {:?}",
                    user_id, setup.id, setup.experiment_id
                );
            }
            assigned.extend(new_setups);
        }

        let mut result = BTreeMap::new();
        if !assigned.is_empty() {
            let ids: Vec<i64> = assigned.iter().map(|s| s.id).collect();
            let mut query = QueryBuilder::<Sqlite>::new(
                r#"
                SELECT v.app_name, v.name, pv.value
                FROM configab_experiment_setup_values sv
                INNER JOIN configab_possible_value pv ON pv.id = sv.possible_value_id
                INNER JOIN configab_variable v ON v.id = pv.variable_id
                WHERE sv.experiment_setup_id IN (
                "#,
            );
            push_ids(&mut query, &ids);
            query.push(")");
            let rows: Vec<(String, String, String)> =
                query.build_query_as().fetch_all(&mut *tx).await?;
            for (app_name, name, value) in rows {
                result.insert(format!("{}.{}", app_name, name), value);
            }
        }

        tx.commit().await?;
        debug!("User {} overrides from experiments: {:?}", user_id, result);
        Ok(result)
    }

    /// Request overrides for the user; values are coerced by type
    pub async fn overrides_for_user(
        &self,
        user_id: i64,
        strategy: &dyn AssignmentStrategy,
    ) -> Result<Overrides> {
        let variables = self.variables_to_override(user_id, strategy).await?;
        Ok(variables
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect())
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<UserSetup>> {
        Ok(sqlx::query_as(
            "SELECT id, user_id, experiment_setup_id FROM configab_user_setup WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }
}
