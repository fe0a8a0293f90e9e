//! proso-server library - HTTP surface of the PROSO platform
//!
//! Wires the stores, the enricher registry and the named routes together.
//! Everything request handlers share lives in [`AppState`], built once at
//! start-up.

use axum::Router;
use proso_common::config::{ConfigStore, Settings};
use proso_common::{EnricherRegistry, Result, RouteTable};
use proso_configab::assignment::strategy_from_settings;
use proso_configab::{
    AnswerLog, AssignmentStrategy, ExperimentSetupStats, ExperimentStore, UserSetupStore,
};
use proso_subscription::{
    ActionSubscribe, PlanStore, SubscriptionStore, SUBSCRIBE_ROUTE, SUBSCRIBE_ROUTE_PATTERN,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub config_store: ConfigStore,
    pub experiments: ExperimentStore,
    pub user_setups: UserSetupStore,
    pub answers: AnswerLog,
    pub plans: PlanStore,
    pub subscriptions: SubscriptionStore,
    pub strategy: Arc<dyn AssignmentStrategy>,
    pub enrichers: Arc<EnricherRegistry>,
    pub routes: RouteTable,
}

impl AppState {
    /// Create the state; the assignment strategy comes from the settings
    pub fn new(db: SqlitePool, settings: Settings) -> Result<Self> {
        let strategy = strategy_from_settings(&settings)?;
        Self::with_strategy(db, settings, strategy)
    }

    pub fn with_strategy(
        db: SqlitePool,
        settings: Settings,
        strategy: Arc<dyn AssignmentStrategy>,
    ) -> Result<Self> {
        let routes = route_table();
        let experiments = ExperimentStore::new(db.clone());
        let enrichers = build_enrichers(&experiments, &routes)?;
        Ok(Self {
            settings: Arc::new(settings),
            config_store: ConfigStore::new(db.clone()),
            user_setups: UserSetupStore::new(db.clone()),
            answers: AnswerLog::new(db.clone()),
            plans: PlanStore::new(db.clone()),
            subscriptions: SubscriptionStore::new(db.clone()),
            experiments,
            strategy,
            enrichers: Arc::new(enrichers),
            routes,
            db,
        })
    }
}

/// Named routes other components build links to
pub fn route_table() -> RouteTable {
    RouteTable::new().with(SUBSCRIBE_ROUTE, SUBSCRIBE_ROUTE_PATTERN)
}

/// Every enricher of the platform, in run order
pub fn build_enrichers(experiments: &ExperimentStore, routes: &RouteTable) -> Result<EnricherRegistry> {
    EnricherRegistry::builder()
        .register(
            ExperimentSetupStats::OBJECT_TYPES,
            Arc::new(ExperimentSetupStats::new(Arc::new(experiments.clone()))),
        )
        .register(
            ActionSubscribe::OBJECT_TYPES,
            Arc::new(ActionSubscribe::new(routes.clone())),
        )
        .build()
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::common_routes())
        .merge(api::configab_routes())
        .merge(api::subscription_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
