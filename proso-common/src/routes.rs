//! Named routes and reverse URL resolution
//!
//! Patterns use the axum path syntax (`/subscription/subscribe/:description_id`)
//! so the same constant can both register a route and build links to it.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt::Display;

/// Name → path pattern table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name.into(), pattern.into());
        self
    }

    pub fn pattern(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }

    /// Build a path by filling `:param` segments positionally
    pub fn reverse(&self, name: &str, args: &[&dyn Display]) -> Result<String> {
        let pattern = self
            .pattern(name)
            .ok_or_else(|| Error::Config(format!("Unknown route '{}'", name)))?;

        let mut remaining = args.iter();
        let mut segments = Vec::new();
        for segment in pattern.split('/') {
            if segment.starts_with(':') || segment.starts_with('*') {
                let arg = remaining.next().ok_or_else(|| {
                    Error::Config(format!("Route '{}' needs more arguments", name))
                })?;
                segments.push(arg.to_string());
            } else {
                segments.push(segment.to_string());
            }
        }
        if remaining.next().is_some() {
            return Err(Error::Config(format!(
                "Route '{}' got too many arguments",
                name
            )));
        }
        Ok(segments.join("/"))
    }
}
