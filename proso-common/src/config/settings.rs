//! Static application settings
//!
//! The settings file holds named sections (`default` unless configured
//! otherwise). Each section is a tree keyed by app name:
//!
//! ```toml
//! [default.proso_configab]
//! answers_per_user = 10
//!
//! [default.proso_common.config]
//! is_custom_config_allowed = false
//! ```
//!
//! Lookup order for `get(app_name, "dotted.key")`:
//! 1. Section tree with request overrides applied
//! 2. Environment variable `APP_NAME_DOTTED_KEY`
//! 3. Caller default

use super::overrides::Overrides;
use crate::conversion::str2type;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_SECTION: &str = "default";

/// Named configuration sections loaded from a TOML or JSON file
#[derive(Debug, Clone)]
pub struct Settings {
    sections: Map<String, Value>,
    default_section: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::empty()
    }
}

impl Settings {
    /// Settings without any section
    pub fn empty() -> Self {
        Self {
            sections: Map::new(),
            default_section: DEFAULT_SECTION.to_string(),
        }
    }

    /// Build settings from an in-memory tree of sections
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(sections) => Ok(Self {
                sections,
                default_section: DEFAULT_SECTION.to_string(),
            }),
            _ => Err(Error::Config(
                "Settings root must be a map of named sections".to_string(),
            )),
        }
    }

    /// Load settings from `*.toml` or `*.json`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                let parsed: toml::Value = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("Parse {} failed: {}", path.display(), e))
                })?;
                serde_json::to_value(parsed)?
            }
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(Error::Config(format!(
                    "There is no support for *.{} settings files",
                    other.unwrap_or("")
                )));
            }
        };
        let settings = Self::from_value(value)?;
        info!(
            "Loaded settings from {} ({} sections)",
            path.display(),
            settings.sections.len()
        );
        Ok(settings)
    }

    /// Load settings, degrading to empty settings when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Settings file {} not found, using empty settings",
                path.display()
            );
            return Ok(Self::empty());
        }
        Self::load(path)
    }

    /// Change the section used when no section is named explicitly
    pub fn with_default_section(mut self, name: impl Into<String>) -> Self {
        self.default_section = name.into();
        self
    }

    pub fn default_section(&self) -> &str {
        &self.default_section
    }

    /// Whole section tree with overrides applied
    pub fn global(&self, section: Option<&str>, overrides: &Overrides) -> Result<Value> {
        let name = section.unwrap_or(&self.default_section);
        let tree = self
            .sections
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        overrides.apply(None, tree)
    }

    /// Look a value up in the default section
    pub fn get(&self, app_name: &str, key: &str, overrides: &Overrides) -> Result<Option<Value>> {
        self.get_in(None, app_name, key, overrides)
    }

    /// Look a value up in the given section
    pub fn get_in(
        &self,
        section: Option<&str>,
        app_name: &str,
        key: &str,
        overrides: &Overrides,
    ) -> Result<Option<Value>> {
        let global = self.global(section, overrides)?;
        let mut current = global.get(app_name);
        for k in key.split('.') {
            current = match current {
                Some(value) => value.get(k),
                None => break,
            };
        }
        if let Some(value) = current {
            if !value.is_null() {
                return Ok(Some(value.clone()));
            }
        }

        let env_name = env_var_name(app_name, key);
        Ok(std::env::var(&env_name)
            .ok()
            .map(|raw| str2type(Value::String(raw))))
    }

    pub fn get_or(
        &self,
        app_name: &str,
        key: &str,
        overrides: &Overrides,
        default: Value,
    ) -> Result<Value> {
        Ok(self.get(app_name, key, overrides)?.unwrap_or(default))
    }

    /// Like [`Settings::get`] but a missing value is an error
    pub fn require(&self, app_name: &str, key: &str, overrides: &Overrides) -> Result<Value> {
        self.get(app_name, key, overrides)?.ok_or_else(|| {
            Error::Config(format!(
                "There is no key [{}] in configuration [{}] and app [{}]",
                key, self.default_section, app_name
            ))
        })
    }
}

/// Environment variable consulted when the settings tree has no value
pub fn env_var_name(app_name: &str, key: &str) -> String {
    format!("{}.{}", app_name, key)
        .replace('.', "_")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> Settings {
        Settings::from_value(json!({
            "default": {"proso_tests": {"a": {"b": {"c": "blah"}}, "n": 3}},
            "super": {"proso_tests": {"other": true}}
        }))
        .unwrap()
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("proso_tests", "a.b.c"), "PROSO_TESTS_A_B_C");
    }

    #[test]
    fn test_dotted_lookup() {
        let s = settings();
        let none = Overrides::new();
        assert_eq!(s.get("proso_tests", "a.b.c", &none).unwrap(), Some(json!("blah")));
        assert_eq!(s.get("proso_tests", "n", &none).unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_other_section() {
        let s = settings().with_default_section("super");
        let none = Overrides::new();
        assert_eq!(s.get("proso_tests", "a.b.c", &none).unwrap(), None);
        assert_eq!(s.get("proso_tests", "other", &none).unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_default_and_require() {
        let s = settings();
        let none = Overrides::new();
        assert_eq!(
            s.get_or("proso_tests", "unknown", &none, json!("is here")).unwrap(),
            json!("is here")
        );
        assert!(matches!(
            s.require("proso_tests", "unknown", &none),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let s = settings();
        let mut overrides = Overrides::new();
        overrides.set("proso_tests.a.b.c", json!("overridden")).unwrap();
        assert_eq!(
            s.get("proso_tests", "a.b.c", &overrides).unwrap(),
            Some(json!("overridden"))
        );
    }

    #[test]
    fn test_rejects_non_map_root() {
        assert!(Settings::from_value(json!([1, 2])).is_err());
    }
}
