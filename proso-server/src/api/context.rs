//! Request context extractor
//!
//! Collects query parameters and the signed-in user (`X-User-Id` header).
//! For signed-in users the A/B overrides of their experiment setups are
//! resolved here, so handlers and enrichers see one consistent context.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use proso_common::RequestContext;
use std::collections::HashMap;
use tracing::debug;

use super::ApiError;
use crate::AppState;

/// Header carrying the id of the signed-in user
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extracted [`RequestContext`]
pub struct Ctx(pub RequestContext);

impl Ctx {
    /// User id, or 401 for anonymous requests
    pub fn require_user(&self) -> Result<i64, ApiError> {
        self.0.user_id().ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Ctx {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e)))?;

        let user_id = match parts.headers.get(USER_ID_HEADER) {
            None => None,
            Some(raw) => {
                let id = raw
                    .to_str()
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("Header '{}' must be an integer", USER_ID_HEADER))
                    })?;
                Some(id)
            }
        };

        let mut ctx = RequestContext::new(params, user_id);
        if let Some(user_id) = user_id {
            let overrides = state
                .user_setups
                .overrides_for_user(user_id, state.strategy.as_ref())
                .await?;
            debug!("User {} runs with {} config overrides", user_id, overrides.len());
            ctx = ctx.with_overrides(overrides);
        }
        Ok(Ctx(ctx))
    }
}
