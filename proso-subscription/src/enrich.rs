//! Enricher offering the subscribe action on plan descriptions

use crate::models::PLAN_DESCRIPTION_TYPE;
use async_trait::async_trait;
use proso_common::enrichment::EnrichedObject;
use proso_common::{Enricher, RequestContext, Result, RouteTable};
use serde_json::Value;
use std::fmt::Display;

/// Name of the subscribe route
pub const SUBSCRIBE_ROUTE: &str = "subscription_subscribe";
pub const SUBSCRIBE_ROUTE_PATTERN: &str = "/subscription/subscribe/:description_id";

/// Sets `actions.subscribe` of plan descriptions for signed-in users
pub struct ActionSubscribe {
    routes: RouteTable,
}

impl ActionSubscribe {
    /// Object types the enricher is registered for
    pub const OBJECT_TYPES: &'static [&'static str] = &[PLAN_DESCRIPTION_TYPE];

    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Enricher for ActionSubscribe {
    fn name(&self) -> &str {
        "action_subscribe"
    }

    async fn enrich(
        &self,
        ctx: &RequestContext,
        objects: &mut [&mut EnrichedObject],
        _nested: bool,
    ) -> Result<()> {
        if !ctx.is_authenticated() {
            return Ok(());
        }
        for object in objects.iter_mut() {
            let id = object.id();
            let args: [&dyn Display; 1] = [&id];
            let url = self.routes.reverse(SUBSCRIBE_ROUTE, &args)?;
            object
                .extra_object_mut("actions")
                .insert("subscribe".to_string(), Value::String(url));
        }
        Ok(())
    }
}
