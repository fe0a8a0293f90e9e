//! Experiment entities and their serialized form

use chrono::NaiveDateTime;
use proso_common::{Error, Record, Result, ToRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

pub const EXPERIMENT_TYPE: &str = "configab_experiment";
pub const VARIABLE_TYPE: &str = "configab_variable";
pub const POSSIBLE_VALUE_TYPE: &str = "configab_possible_value";
pub const EXPERIMENT_SETUP_TYPE: &str = "configab_experiment_setup";
pub const USER_SETUP_TYPE: &str = "configab_user_setup";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Experiment {
    pub id: i64,
    pub identifier: String,
    pub is_enabled: bool,
    pub is_paused: bool,
    pub time_created: NaiveDateTime,
    pub time_disabled: Option<NaiveDateTime>,
}

impl Experiment {
    fn fields(&self) -> Value {
        let mut fields = json!({
            "identifier": self.identifier,
            "is_enabled": self.is_enabled,
            "is_paused": self.is_paused,
            "time_created": self.time_created.format(TIME_FORMAT).to_string(),
        });
        if let (false, Some(disabled)) = (self.is_enabled, self.time_disabled) {
            fields["time_disabled"] = json!(disabled.format(TIME_FORMAT).to_string());
        }
        fields
    }
}

impl ToRecord for Experiment {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        Record::from_json(EXPERIMENT_TYPE, self.id, self.fields())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, FromRow)]
pub struct Variable {
    pub id: i64,
    pub app_name: String,
    pub name: String,
}

impl Variable {
    /// Override key, `app_name.name`
    pub fn app_name_key(&self) -> String {
        format!("{}.{}", self.app_name, self.name)
    }
}

impl ToRecord for Variable {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        Record::from_json(
            VARIABLE_TYPE,
            self.id,
            json!({"app_name": self.app_name, "name": self.name}),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PossibleValue {
    pub id: i64,
    pub variable_id: i64,
    pub experiment_id: i64,
    pub value: String,
}

impl ToRecord for PossibleValue {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        Record::from_json(
            POSSIBLE_VALUE_TYPE,
            self.id,
            json!({
                "value": self.value,
                "variable_id": self.variable_id,
                "experiment_id": self.experiment_id,
            }),
        )
    }
}

/// One combination of possible values within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ExperimentSetup {
    pub id: i64,
    pub experiment_id: Option<i64>,
    pub content_hash: String,
    pub probability: Option<f64>,
    #[sqlx(skip)]
    pub values: Vec<PossibleValue>,
    /// Parent experiment, loaded only for top-level setups
    #[sqlx(skip)]
    pub experiment: Option<Experiment>,
}

impl ExperimentSetup {
    /// Assignment weight; setups created before weighting count as zero
    pub fn weight(&self) -> f64 {
        self.probability.unwrap_or(0.0)
    }
}

impl ToRecord for ExperimentSetup {
    fn to_record(&self, nested: bool) -> Result<Record> {
        let mut fields = json!({
            "content_hash": self.content_hash,
            "probability": self.probability,
        });
        match (&self.experiment, nested) {
            (Some(experiment), false) => {
                fields["experiment"] = experiment.to_record(true)?.into_json();
            }
            _ => fields["experiment_id"] = json!(self.experiment_id),
        }
        let values = self
            .values
            .iter()
            .map(|v| v.to_record(true))
            .collect::<Result<Vec<_>>>()?;
        Ok(Record::from_json(EXPERIMENT_SETUP_TYPE, self.id, fields)?.with_children("values", values))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct UserSetup {
    pub id: i64,
    pub user_id: i64,
    pub experiment_setup_id: i64,
}

impl ToRecord for UserSetup {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        Record::from_json(
            USER_SETUP_TYPE,
            self.id,
            json!({
                "user_id": self.user_id,
                "experiment_setup_id": self.experiment_setup_id,
            }),
        )
    }
}

/// Experiment with its variables, possible values and setups
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDetail {
    pub experiment: Experiment,
    pub variables: Vec<(Variable, Vec<PossibleValue>)>,
    pub setups: Vec<ExperimentSetup>,
}

impl ToRecord for ExperimentDetail {
    fn to_record(&self, nested: bool) -> Result<Record> {
        let mut record = self.experiment.to_record(nested)?;
        if nested {
            return Ok(record);
        }
        if !self.variables.is_empty() {
            let variables = self
                .variables
                .iter()
                .map(|(variable, values)| {
                    let values = values
                        .iter()
                        .map(|v| v.to_record(true))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(variable.to_record(true)?.with_children("possible_values", values))
                })
                .collect::<Result<Vec<_>>>()?;
            record = record.with_children("variables", variables);
        }
        let setups = self
            .setups
            .iter()
            .map(|s| s.to_record(true))
            .collect::<Result<Vec<_>>>()?;
        Ok(record.with_children("setups", setups))
    }
}

/// Definition of a new experiment, as accepted by [`crate::ExperimentStore::create`]
///
/// ```json
/// {
///   "identifier": "new-practice",
///   "paused": false,
///   "variables": [
///     {"app_name": "proso_models", "name": "practice_size",
///      "values": [{"value": 10, "probability": 50}, {"value": 20, "probability": 50}]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    #[serde(alias = "id")]
    pub identifier: String,
    #[serde(default)]
    pub paused: bool,
    pub variables: Vec<VariableDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub app_name: String,
    pub name: String,
    pub values: Vec<ValueDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDefinition {
    pub value: Value,
    pub probability: f64,
}

impl ValueDefinition {
    /// Stored text of the value; strings are kept verbatim, anything else as JSON
    pub fn text(&self) -> Result<String> {
        match &self.value {
            Value::String(s) => Ok(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => Err(Error::InvalidInput(format!(
                "Possible value must be a scalar, got {}",
                self.value
            ))),
            other => Ok(other.to_string()),
        }
    }
}
