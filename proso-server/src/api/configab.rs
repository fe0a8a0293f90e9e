//! A/B experiment endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use proso_common::{Record, ToRecord};
use proso_configab::{ExperimentDefinition, APP_NAME};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{render_many, render_one, ApiError, Ctx};
use crate::AppState;

/// Config key of configuration snapshots attached to answers
const ANSWER_CONFIG_KEY: &str = "answer";

fn records<T: ToRecord>(items: &[T], nested: bool) -> Result<Vec<Record>, ApiError> {
    Ok(items
        .iter()
        .map(|item| item.to_record(nested))
        .collect::<proso_common::Result<Vec<_>>>()?)
}

/// GET /configab/experiments
pub async fn list_experiments(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Json<Value>, ApiError> {
    let experiments = state.experiments.list().await?;
    render_many(&state, &ctx, records(&experiments, false)?, false).await
}

/// POST /configab/experiments
pub async fn create_experiment(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(definition): Json<ExperimentDefinition>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = ctx.require_user()?;
    let detail = state.experiments.create(&definition).await?;
    info!(
        "User {} created experiment '{}'",
        user_id, detail.experiment.identifier
    );
    let body = render_one(&state, &ctx.0, detail.to_record(false)?).await?;
    Ok((StatusCode::CREATED, body))
}

/// GET /configab/experiment/:id
pub async fn get_experiment(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.experiments.get(id).await?;
    render_one(&state, &ctx, detail.to_record(false)?).await
}

/// GET /configab/experimentsetups
///
/// Optional `experiment` query parameter restricts the listing.
pub async fn list_setups(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Json<Value>, ApiError> {
    let experiment_id = match ctx.param("experiment") {
        None => None,
        Some(_) => Some(ctx.param_i64("experiment", 0)?),
    };
    let setups = state.experiments.list_setups(experiment_id).await?;
    render_many(&state, &ctx, records(&setups, false)?, false).await
}

/// GET /configab/experimentsetup/:id
pub async fn get_setup(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let setup = state.experiments.get_setup(id).await?;
    render_one(&state, &ctx, setup.to_record(false)?).await
}

/// Body of POST /configab/answer
#[derive(Debug, Default, Deserialize)]
pub struct AnswerBody {
    pub session_id: Option<i64>,
    /// Configuration the answer was given under
    pub config: Option<Value>,
}

/// POST /configab/answer
///
/// Without an explicit `config` the user's current overrides are recorded.
pub async fn record_answer(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(body): Json<AnswerBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = ctx.require_user()?;

    let snapshot = match body.config {
        Some(config) => Some(config),
        None if !ctx.0.overrides().is_empty() => Some(Value::Object(
            ctx.0
                .overrides()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )),
        None => None,
    };
    let config_id = match snapshot {
        Some(content) => Some(
            state
                .config_store
                .from_content(Some(APP_NAME), Some(ANSWER_CONFIG_KEY), &content)
                .await?
                .id,
        ),
        None => None,
    };

    let answer_id = state
        .answers
        .record(user_id, body.session_id, config_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": { "id": answer_id, "config_id": config_id } })),
    ))
}

/// Build experiment routes
pub fn configab_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/configab/experiments",
            get(list_experiments).post(create_experiment),
        )
        .route("/configab/experiment/:id", get(get_experiment))
        .route("/configab/experimentsetups", get(list_setups))
        .route("/configab/experimentsetup/:id", get(get_setup))
        .route("/configab/answer", post(record_answer))
}
