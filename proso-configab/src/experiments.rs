//! Experiment store
//!
//! Creating an experiment materializes its whole design at once: variables,
//! possible values and one setup per combination of values.

use crate::models::{
    Experiment, ExperimentDefinition, ExperimentDetail, ExperimentSetup, PossibleValue, Variable,
};
use chrono::Utc;
use proso_common::config::content_hash;
use proso_common::db::push_ids;
use proso_common::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const EXPERIMENT_COLUMNS: &str =
    "id, identifier, is_enabled, is_paused, time_created, time_disabled";

/// Possible values of one variable must add up to this
const TOTAL_PROBABILITY: f64 = 100.0;

/// Database-backed store of experiments and their setups
#[derive(Debug, Clone)]
pub struct ExperimentStore {
    pub(crate) db: SqlitePool,
}

impl ExperimentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert an experiment with its variables, values and setups
    ///
    /// Fails with `InvalidInput` when the identifier is taken, when there are
    /// no variables, when a variable repeats a value or when the
    /// probabilities of a variable do not add up to 100.
    pub async fn create(&self, definition: &ExperimentDefinition) -> Result<ExperimentDetail> {
        validate(definition)?;

        let mut tx = self.db.begin().await?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM configab_experiment WHERE identifier = ?)",
        )
        .bind(&definition.identifier)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(Error::InvalidInput(format!(
                "Experiment '{}' already exists",
                definition.identifier
            )));
        }

        let experiment_id = sqlx::query(
            "INSERT INTO configab_experiment (identifier, is_enabled, is_paused, time_created) VALUES (?, 1, ?, ?)",
        )
        .bind(&definition.identifier)
        .bind(definition.paused)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // (variable id, [(value id, probability)]) in definition order
        let mut dimensions: Vec<(i64, Vec<(i64, f64)>)> = Vec::new();
        for variable in &definition.variables {
            sqlx::query("INSERT OR IGNORE INTO configab_variable (app_name, name) VALUES (?, ?)")
                .bind(&variable.app_name)
                .bind(&variable.name)
                .execute(&mut *tx)
                .await?;
            let variable_id: i64 = sqlx::query_scalar(
                "SELECT id FROM configab_variable WHERE app_name = ? AND name = ?",
            )
            .bind(&variable.app_name)
            .bind(&variable.name)
            .fetch_one(&mut *tx)
            .await?;

            let mut values = Vec::with_capacity(variable.values.len());
            for value in &variable.values {
                let value_id = sqlx::query(
                    "INSERT INTO configab_possible_value (variable_id, experiment_id, value) VALUES (?, ?, ?)",
                )
                .bind(variable_id)
                .bind(experiment_id)
                .bind(value.text()?)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
                values.push((value_id, value.probability));
            }
            dimensions.push((variable_id, values));
        }

        let combinations = product(&dimensions);
        let total: f64 = combinations.iter().map(|c| weight(c)).sum();
        for combination in &combinations {
            let probability = setup_probability(weight(combination), total);
            setup_from_values(&mut *tx, experiment_id, combination, probability).await?;
        }

        tx.commit().await?;
        info!(
            "Experiment '{}' created with {} setups",
            definition.identifier,
            combinations.len()
        );
        self.get(experiment_id).await
    }

    /// Disable the experiment; it can not be enabled again
    pub async fn disable(&self, id: i64) -> Result<Experiment> {
        sqlx::query(
            "UPDATE configab_experiment SET is_enabled = 0, time_disabled = ? WHERE id = ? AND is_enabled = 1",
        )
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(&self.db)
        .await?;
        let experiment = self.get_experiment(id).await?;
        info!("Experiment '{}' disabled", experiment.identifier);
        Ok(experiment)
    }

    /// Paused experiments keep their users but assign nobody new
    pub async fn pause(&self, id: i64, paused: bool) -> Result<Experiment> {
        let result = sqlx::query("UPDATE configab_experiment SET is_paused = ? WHERE id = ?")
            .bind(paused)
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(experiment_not_found(id));
        }
        let experiment = self.get_experiment(id).await?;
        info!(
            "Experiment '{}' {}",
            experiment.identifier,
            if paused { "paused" } else { "unpaused" }
        );
        Ok(experiment)
    }

    /// Experiment row only
    pub async fn get_experiment(&self, id: i64) -> Result<Experiment> {
        sqlx::query_as(&format!(
            "SELECT {} FROM configab_experiment WHERE id = ?",
            EXPERIMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| experiment_not_found(id))
    }

    pub async fn get(&self, id: i64) -> Result<ExperimentDetail> {
        let experiment = self.get_experiment(id).await?;
        let mut details = self.load_details(vec![experiment]).await?;
        details
            .pop()
            .ok_or_else(|| Error::Internal(format!("Details of experiment {} not loaded", id)))
    }

    pub async fn list(&self) -> Result<Vec<ExperimentDetail>> {
        let experiments: Vec<Experiment> = sqlx::query_as(&format!(
            "SELECT {} FROM configab_experiment ORDER BY id",
            EXPERIMENT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        self.load_details(experiments).await
    }

    /// Setup with its values and parent experiment
    pub async fn get_setup(&self, id: i64) -> Result<ExperimentSetup> {
        let setup: ExperimentSetup = sqlx::query_as(
            "SELECT id, experiment_id, content_hash, probability FROM configab_experiment_setup WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Experiment setup {} not found", id)))?;
        let mut setups = vec![setup];
        self.attach_values(&mut setups).await?;
        self.attach_experiments(&mut setups).await?;
        setups
            .pop()
            .ok_or_else(|| Error::Internal(format!("Experiment setup {} not loaded", id)))
    }

    /// All setups, optionally of one experiment only
    pub async fn list_setups(&self, experiment_id: Option<i64>) -> Result<Vec<ExperimentSetup>> {
        let mut setups: Vec<ExperimentSetup> = sqlx::query_as(
            r#"
            SELECT id, experiment_id, content_hash, probability
            FROM configab_experiment_setup
            WHERE ? IS NULL OR experiment_id = ?
            ORDER BY id
            "#,
        )
        .bind(experiment_id)
        .bind(experiment_id)
        .fetch_all(&self.db)
        .await?;
        self.attach_values(&mut setups).await?;
        self.attach_experiments(&mut setups).await?;
        Ok(setups)
    }

    async fn load_details(&self, experiments: Vec<Experiment>) -> Result<Vec<ExperimentDetail>> {
        if experiments.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = experiments.iter().map(|e| e.id).collect();

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT v.id, v.app_name, v.name, pv.id, pv.variable_id, pv.experiment_id, pv.value
            FROM configab_possible_value pv
            INNER JOIN configab_variable v ON v.id = pv.variable_id
            WHERE pv.experiment_id IN (
            "#,
        );
        push_ids(&mut query, &ids);
        query.push(") ORDER BY pv.experiment_id, v.id, pv.id");
        let rows: Vec<(i64, String, String, i64, i64, i64, String)> =
            query.build_query_as().fetch_all(&self.db).await?;

        let mut variables: HashMap<i64, Vec<(Variable, Vec<PossibleValue>)>> = HashMap::new();
        for (variable_id, app_name, name, value_id, _, experiment_id, value) in rows {
            let possible_value = PossibleValue {
                id: value_id,
                variable_id,
                experiment_id,
                value,
            };
            let entry = variables.entry(experiment_id).or_default();
            match entry.last_mut() {
                Some((variable, values)) if variable.id == variable_id => values.push(possible_value),
                _ => entry.push((
                    Variable {
                        id: variable_id,
                        app_name,
                        name,
                    },
                    vec![possible_value],
                )),
            }
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, experiment_id, content_hash, probability FROM configab_experiment_setup WHERE experiment_id IN (",
        );
        push_ids(&mut query, &ids);
        query.push(") ORDER BY id");
        let mut setups: Vec<ExperimentSetup> = query.build_query_as().fetch_all(&self.db).await?;
        self.attach_values(&mut setups).await?;

        let mut setups_by_experiment: HashMap<i64, Vec<ExperimentSetup>> = HashMap::new();
        for setup in setups {
            if let Some(experiment_id) = setup.experiment_id {
                setups_by_experiment.entry(experiment_id).or_default().push(setup);
            }
        }

        Ok(experiments
            .into_iter()
            .map(|experiment| ExperimentDetail {
                variables: variables.remove(&experiment.id).unwrap_or_default(),
                setups: setups_by_experiment.remove(&experiment.id).unwrap_or_default(),
                experiment,
            })
            .collect())
    }

    /// Load the possible values of all setups with one query
    pub(crate) async fn attach_values(&self, setups: &mut [ExperimentSetup]) -> Result<()> {
        if setups.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = setups.iter().map(|s| s.id).collect();
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT sv.experiment_setup_id, pv.id, pv.variable_id, pv.experiment_id, pv.value
            FROM configab_experiment_setup_values sv
            INNER JOIN configab_possible_value pv ON pv.id = sv.possible_value_id
            WHERE sv.experiment_setup_id IN (
            "#,
        );
        push_ids(&mut query, &ids);
        query.push(") ORDER BY pv.variable_id, pv.id");
        let rows: Vec<(i64, i64, i64, i64, String)> =
            query.build_query_as().fetch_all(&self.db).await?;

        let mut values: HashMap<i64, Vec<PossibleValue>> = HashMap::new();
        for (setup_id, id, variable_id, experiment_id, value) in rows {
            values.entry(setup_id).or_default().push(PossibleValue {
                id,
                variable_id,
                experiment_id,
                value,
            });
        }
        for setup in setups.iter_mut() {
            setup.values = values.remove(&setup.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn attach_experiments(&self, setups: &mut [ExperimentSetup]) -> Result<()> {
        let ids: Vec<i64> = setups.iter().filter_map(|s| s.experiment_id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM configab_experiment WHERE id IN (",
            EXPERIMENT_COLUMNS
        ));
        push_ids(&mut query, &ids);
        query.push(")");
        let experiments: HashMap<i64, Experiment> = query
            .build_query_as::<Experiment>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();
        for setup in setups.iter_mut() {
            setup.experiment = setup.experiment_id.and_then(|id| experiments.get(&id).cloned());
        }
        Ok(())
    }
}

fn experiment_not_found(id: i64) -> Error {
    Error::NotFound(format!("Experiment {} not found", id))
}

fn validate(definition: &ExperimentDefinition) -> Result<()> {
    if definition.variables.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Experiment '{}' has no variables",
            definition.identifier
        )));
    }
    for variable in &definition.variables {
        let sum: f64 = variable.values.iter().map(|v| v.probability).sum();
        if (sum - TOTAL_PROBABILITY).abs() > 1e-9 {
            return Err(Error::InvalidInput(format!(
                "The total sum of probs for variable \"{}.{}\" is {}, expected 100",
                variable.app_name, variable.name, sum
            )));
        }
        if variable.values.iter().any(|v| v.probability <= 0.0) {
            return Err(Error::InvalidInput(format!(
                "Variable \"{}.{}\" has a value with non-positive probability",
                variable.app_name, variable.name
            )));
        }
        let mut seen = Vec::with_capacity(variable.values.len());
        for value in &variable.values {
            let text = value.text()?;
            if seen.contains(&text) {
                return Err(Error::InvalidInput(format!(
                    "Variable \"{}.{}\" repeats value '{}'",
                    variable.app_name, variable.name, text
                )));
            }
            seen.push(text);
        }
    }
    Ok(())
}

/// One value per variable: `(variable id, value id, probability)`
type Combination = Vec<(i64, i64, f64)>;

/// Cartesian product of the values of all variables
fn product(dimensions: &[(i64, Vec<(i64, f64)>)]) -> Vec<Combination> {
    let mut combinations: Vec<Combination> = vec![Vec::new()];
    for (variable_id, values) in dimensions {
        combinations = combinations
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |(value_id, probability)| {
                    let mut combination = prefix.clone();
                    combination.push((*variable_id, *value_id, *probability));
                    combination
                })
            })
            .collect();
    }
    combinations
}

/// Product of the value probabilities as fractions
fn weight(combination: &Combination) -> f64 {
    combination
        .iter()
        .map(|(_, _, p)| p / TOTAL_PROBABILITY)
        .product()
}

fn setup_probability(weight: f64, total: f64) -> f64 {
    TOTAL_PROBABILITY * weight / if total > 0.0 { total } else { 1.0 }
}

/// Hash identifying a combination within an experiment
///
/// Canonical JSON of `{variable_id: value_id}` with sorted keys and `", "` /
/// `": "` separators.
pub fn setup_content_hash(combination: &[(i64, i64)]) -> String {
    let sorted: BTreeMap<String, i64> = combination
        .iter()
        .map(|(variable_id, value_id)| (variable_id.to_string(), *value_id))
        .collect();
    let body = sorted
        .iter()
        .map(|(variable_id, value_id)| format!("\"{}\": {}", variable_id, value_id))
        .collect::<Vec<_>>()
        .join(", ");
    content_hash(&format!("{{{}}}", body))
}

/// Get or create the setup of a combination
async fn setup_from_values(
    conn: &mut SqliteConnection,
    experiment_id: i64,
    combination: &Combination,
    probability: f64,
) -> Result<i64> {
    let pairs: Vec<(i64, i64)> = combination.iter().map(|(v, value, _)| (*v, *value)).collect();
    let hash = setup_content_hash(&pairs);

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM configab_experiment_setup WHERE content_hash = ? AND experiment_id = ?",
    )
    .bind(&hash)
    .bind(experiment_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let setup_id = sqlx::query(
        "INSERT INTO configab_experiment_setup (experiment_id, content_hash, probability) VALUES (?, ?, ?)",
    )
    .bind(experiment_id)
    .bind(&hash)
    .bind(probability)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for (_, value_id) in &pairs {
        sqlx::query(
            "INSERT INTO configab_experiment_setup_values (experiment_setup_id, possible_value_id) VALUES (?, ?)",
        )
        .bind(setup_id)
        .bind(value_id)
        .execute(&mut *conn)
        .await?;
    }
    debug!(
        "Setup {} of experiment {} created with probability {}",
        setup_id, experiment_id, probability
    );
    Ok(setup_id)
}
