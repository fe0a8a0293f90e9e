//! # PROSO Config A/B Experiments
//!
//! Experiments vary configuration variables between users. Each experiment
//! owns a set of possible values per variable; every combination of values is
//! an experiment setup. A user gets one setup per running experiment and the
//! setup's values override the static settings for that user's requests.

pub mod answers;
pub mod assignment;
pub mod enrich;
pub mod experiments;
pub mod models;
pub mod stats;
pub mod user_setup;

pub use answers::AnswerLog;
pub use assignment::{AssignmentStrategy, RandomStrategy};
pub use enrich::ExperimentSetupStats;
pub use experiments::ExperimentStore;
pub use models::{
    Experiment, ExperimentDefinition, ExperimentDetail, ExperimentSetup, PossibleValue,
    UserSetup, ValueDefinition, Variable, VariableDefinition,
};
pub use stats::StatsSource;
pub use user_setup::UserSetupStore;

/// App name used for settings and stored config of this crate
pub const APP_NAME: &str = "proso_configab";
