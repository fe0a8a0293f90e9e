//! Subscription endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use proso_common::ToRecord;
use proso_subscription::SUBSCRIBE_ROUTE_PATTERN;
use serde_json::Value;

use super::{render_many, render_one, ApiError, Ctx};
use crate::AppState;

/// GET /subscription/plans
pub async fn list_plans(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Json<Value>, ApiError> {
    let plans = state
        .plans
        .active_plans()
        .await?
        .iter()
        .map(|plan| plan.to_record(false))
        .collect::<proso_common::Result<Vec<_>>>()?;
    render_many(&state, &ctx, plans, false).await
}

/// POST /subscription/subscribe/:description_id
pub async fn subscribe(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(description_id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = ctx.require_user()?;
    let subscription = state.subscriptions.subscribe(user_id, description_id).await?;
    let body = render_one(&state, &ctx.0, subscription.to_record(false)?).await?;
    Ok((StatusCode::ACCEPTED, body))
}

/// GET /subscription/mysubscriptions
pub async fn my_subscriptions(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Value>, ApiError> {
    let user_id = ctx.require_user()?;
    let subscriptions = state
        .subscriptions
        .for_user(user_id)
        .await?
        .iter()
        .map(|subscription| subscription.to_record(false))
        .collect::<proso_common::Result<Vec<_>>>()?;
    render_many(&state, &ctx.0, subscriptions, false).await
}

/// Build subscription routes
pub fn subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/subscription/plans", get(list_plans))
        .route(SUBSCRIBE_ROUTE_PATTERN, post(subscribe))
        .route("/subscription/mysubscriptions", get(my_subscriptions))
}
