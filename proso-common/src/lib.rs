//! # PROSO Common Library
//!
//! Shared code for all PROSO platform crates including:
//! - Database schema and migrations
//! - Configuration (stored overrides, static settings, request overrides)
//! - JSON enrichment pipeline
//! - Request context and named routes
//! - Value coercion and statistics helpers

pub mod config;
pub mod conversion;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod metric;
pub mod random;
pub mod request;
pub mod routes;

pub use conversion::{str2type, ConfigValue};
pub use enrichment::{EnrichedObject, Enricher, EnricherRegistry, Record, ToRecord};
pub use error::{Error, Result};
pub use request::RequestContext;
pub use routes::RouteTable;
