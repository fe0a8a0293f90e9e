//! HTTP API handlers for proso-server

pub mod common;
pub mod configab;
pub mod context;
pub mod error;
pub mod health;
pub mod subscription;

pub use common::common_routes;
pub use configab::configab_routes;
pub use context::Ctx;
pub use error::ApiError;
pub use health::health_routes;
pub use subscription::subscription_routes;

use axum::Json;
use proso_common::{Record, RequestContext};
use serde_json::{json, Value};

use crate::AppState;

/// Enrich records and wrap them as `{"data": [...]}`
pub async fn render_many(
    state: &AppState,
    ctx: &RequestContext,
    records: Vec<Record>,
    nested: bool,
) -> Result<Json<Value>, ApiError> {
    let data = state.enrichers.enrich_json(ctx, records, nested).await?;
    Ok(Json(json!({ "data": data })))
}

/// Enrich one record and wrap it as `{"data": {...}}`
pub async fn render_one(
    state: &AppState,
    ctx: &RequestContext,
    record: Record,
) -> Result<Json<Value>, ApiError> {
    let data = state
        .enrichers
        .enrich_json(ctx, vec![record], false)
        .await?
        .pop()
        .unwrap_or(Value::Null);
    Ok(Json(json!({ "data": data })))
}
