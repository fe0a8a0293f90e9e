//! Configuration layers
//!
//! - [`bootstrap`]: server start-up config (root folder, bind address, logging)
//! - [`settings`]: static application settings file with named sections
//! - [`overrides`]: request-scoped overrides applied on top of the settings
//! - [`store`]: database-backed config override store

pub mod bootstrap;
pub mod overrides;
pub mod settings;
pub mod store;

pub use bootstrap::{resolve_root_folder, ConfigSource, LoggingConfig, ServerConfig};
pub use overrides::{override_value, Overrides};
pub use settings::Settings;
pub use store::{content_hash, Config, ConfigStore};
