//! Configuration endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use proso_common::{Error, ToRecord};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{render_one, ApiError, Ctx};
use crate::AppState;

/// GET /common/config
///
/// Static settings section (`config_section` query parameter, default
/// section otherwise) with the request's overrides applied.
pub async fn get_config(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Json<Value>, ApiError> {
    let tree = state
        .settings
        .global(ctx.param("config_section"), ctx.overrides())?;
    Ok(Json(json!({ "data": tree })))
}

/// GET /common/stored_config
///
/// Most specific stored config for `app_name`/`key`. A `hash` equal to the
/// current content hash answers 304 without a body.
pub async fn get_stored_config(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Response, ApiError> {
    let app_name = ctx.param("app_name");
    let key = ctx.param("key");

    if let Some(hash) = ctx.param("hash") {
        if state.config_store.is_current(app_name, key, hash).await? {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let config = state.config_store.get(app_name, key).await?.ok_or_else(|| {
        Error::NotFound(format!(
            "No config for app_name={:?} key={:?}",
            app_name, key
        ))
    })?;
    Ok(render_one(&state, &ctx, config.to_record(false)?)
        .await?
        .into_response())
}

/// Body of PUT /common/stored_config
#[derive(Debug, Deserialize)]
pub struct StoredConfigBody {
    pub app_name: Option<String>,
    pub key: Option<String>,
    pub content: Value,
}

/// PUT /common/stored_config
///
/// Strings are stored verbatim, anything else as its JSON text.
pub async fn put_stored_config(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(body): Json<StoredConfigBody>,
) -> Result<Json<Value>, ApiError> {
    let user_id = ctx.require_user()?;
    let content = match &body.content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let config = state
        .config_store
        .set(body.app_name.as_deref(), body.key.as_deref(), &content)
        .await?;
    info!(
        "User {} stored config app_name={:?} key={:?}",
        user_id, config.app_name, config.key
    );
    render_one(&state, &ctx.0, config.to_record(false)?).await
}

/// Build configuration routes
pub fn common_routes() -> Router<AppState> {
    Router::new()
        .route("/common/config", get(get_config))
        .route(
            "/common/stored_config",
            get(get_stored_config).put(put_stored_config),
        )
}
