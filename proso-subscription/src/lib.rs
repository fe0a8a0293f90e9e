//! # PROSO Subscriptions
//!
//! Subscription plans with localized descriptions, and users' subscriptions
//! to them. Payments are not handled here: a subscription is active from the
//! moment it is created.

pub mod enrich;
pub mod models;
pub mod plans;
pub mod subscriptions;

pub use enrich::{ActionSubscribe, SUBSCRIBE_ROUTE, SUBSCRIBE_ROUTE_PATTERN};
pub use models::{NewPlan, NewPlanDescription, PlanWithDescriptions, Subscription, SubscriptionPlan, SubscriptionPlanDescription};
pub use plans::PlanStore;
pub use subscriptions::SubscriptionStore;
