//! Per-request context handed to enrichers and config lookups

use crate::config::overrides::Overrides;
use crate::{Error, Result};
use std::collections::HashMap;

/// What a request carries besides its body
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    params: HashMap<String, String>,
    user_id: Option<i64>,
    overrides: Overrides,
}

impl RequestContext {
    pub fn new(params: HashMap<String, String>, user_id: Option<i64>) -> Self {
        Self {
            params,
            user_id,
            overrides: Overrides::new(),
        }
    }

    /// Context without parameters or user
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Integer query parameter; absent means `default`, garbage is an error
    pub fn param_i64(&self, name: &str, default: i64) -> Result<i64> {
        match self.param(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                Error::Parse(format!(
                    "Query parameter '{}' must be an integer, got '{}'",
                    name, raw
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_i64_default() {
        let ctx = RequestContext::anonymous();
        assert_eq!(ctx.param_i64("answers_per_user", 10).unwrap(), 10);
    }

    #[test]
    fn test_param_i64_parses() {
        let ctx = RequestContext::anonymous().with_param("answers_per_user", "25");
        assert_eq!(ctx.param_i64("answers_per_user", 10).unwrap(), 25);
    }

    #[test]
    fn test_param_i64_rejects_garbage() {
        let ctx = RequestContext::anonymous().with_param("answers_per_user", "ten");
        assert!(matches!(ctx.param_i64("answers_per_user", 10), Err(Error::Parse(_))));
    }

    #[test]
    fn test_authentication() {
        assert!(!RequestContext::anonymous().is_authenticated());
        assert!(RequestContext::new(HashMap::new(), Some(7)).is_authenticated());
    }
}
