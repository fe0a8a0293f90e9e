//! Config override store
//!
//! Flat key/value table scoped by `(app_name, key)`, where a missing app name
//! means "global" and a missing key means "catch-all for the app". Lookups
//! resolve the most specific scope first:
//!
//! 1. `(app_name, key)`
//! 2. `(app_name, NULL)`
//! 3. `(NULL, key)`
//! 4. `(NULL, NULL)`
//!
//! Every write recomputes `content_hash` (SHA-1 of the content) so clients can
//! detect changes without re-parsing the content.

use crate::conversion::ConfigValue;
use crate::enrichment::{Record, ToRecord};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Object type of serialized config rows
pub const CONFIG_OBJECT_TYPE: &str = "config";

/// One stored config row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Config {
    pub id: i64,
    pub app_name: Option<String>,
    pub key: Option<String>,
    pub content: String,
    pub content_hash: String,
}

impl Config {
    /// Content parsed at read time; invalid JSON stays raw
    pub fn value(&self) -> ConfigValue {
        ConfigValue::parse(&self.content)
    }

    /// Scope precedence, lower is more specific
    fn specificity(&self, app_name: Option<&str>, key: Option<&str>) -> Option<u8> {
        let app_matches = self.app_name.as_deref() == app_name;
        let key_matches = self.key.as_deref() == key;
        match (self.app_name.is_some(), self.key.is_some()) {
            (true, true) if app_matches && key_matches => Some(0),
            (true, false) if app_matches => Some(1),
            (false, true) if key_matches => Some(2),
            (false, false) => Some(3),
            _ => None,
        }
    }
}

impl ToRecord for Config {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        let fields = json!({
            "content": self.value(),
            "key": self.key,
            "app_name": self.app_name,
            "content_hash": self.content_hash,
        });
        Record::from_json(CONFIG_OBJECT_TYPE, self.id, fields)
    }
}

/// SHA-1 hex digest (40 characters) of the content bytes
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Database-backed config store
#[derive(Debug, Clone)]
pub struct ConfigStore {
    db: SqlitePool,
}

impl ConfigStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve the most specific row for the scope
    pub async fn get(&self, app_name: Option<&str>, key: Option<&str>) -> Result<Option<Config>> {
        let candidates: Vec<Config> = sqlx::query_as(
            r#"
            SELECT id, app_name, key, content, content_hash
            FROM config
            WHERE (app_name IS ? OR app_name IS NULL)
              AND (key IS ? OR key IS NULL)
            ORDER BY id DESC
            "#,
        )
        .bind(app_name)
        .bind(key)
        .fetch_all(&self.db)
        .await?;

        // Candidates are newest first, so min_by_key keeps the newest row of a scope
        let resolved = candidates
            .into_iter()
            .filter_map(|c| c.specificity(app_name, key).map(|s| (s, c)))
            .min_by_key(|(s, _)| *s)
            .map(|(_, c)| c);

        debug!(
            "Config lookup ({:?}, {:?}) resolved to {:?}",
            app_name,
            key,
            resolved.as_ref().map(|c| (&c.app_name, &c.key))
        );
        Ok(resolved)
    }

    pub async fn get_content(&self, app_name: Option<&str>, key: Option<&str>) -> Result<Option<String>> {
        Ok(self.get(app_name, key).await?.map(|c| c.content))
    }

    /// Resolved content or the caller default
    pub async fn get_or(&self, app_name: Option<&str>, key: Option<&str>, default: &str) -> Result<String> {
        Ok(self
            .get_content(app_name, key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Resolved content as a typed value
    pub async fn get_value(&self, app_name: Option<&str>, key: Option<&str>) -> Result<Option<ConfigValue>> {
        Ok(self.get(app_name, key).await?.map(|c| c.value()))
    }

    /// True when the resolved row still has the given hash
    pub async fn is_current(&self, app_name: Option<&str>, key: Option<&str>, hash: &str) -> Result<bool> {
        Ok(self
            .get(app_name, key)
            .await?
            .is_some_and(|c| c.content_hash == hash))
    }

    /// Upsert the newest row of exactly this scope
    pub async fn set(&self, app_name: Option<&str>, key: Option<&str>, content: &str) -> Result<Config> {
        let hash = content_hash(content);
        let mut tx = self.db.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM config WHERE app_name IS ? AND key IS ? ORDER BY id DESC LIMIT 1",
        )
        .bind(app_name)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some(id) => {
                sqlx::query("UPDATE config SET content = ?, content_hash = ? WHERE id = ?")
                    .bind(content)
                    .bind(&hash)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
            None => sqlx::query(
                "INSERT INTO config (app_name, key, content, content_hash) VALUES (?, ?, ?, ?)",
            )
            .bind(app_name)
            .bind(key)
            .bind(content)
            .bind(&hash)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid(),
        };
        tx.commit().await?;

        debug!("Config ({:?}, {:?}) set, hash {}", app_name, key, hash);
        Ok(Config {
            id,
            app_name: app_name.map(str::to_string),
            key: key.map(str::to_string),
            content: content.to_string(),
            content_hash: hash,
        })
    }

    /// Get or create a snapshot row holding `value` as canonical JSON
    pub async fn from_content(&self, app_name: Option<&str>, key: Option<&str>, value: &Value) -> Result<Config> {
        // serde_json maps keep keys sorted, which makes the text canonical
        let content = serde_json::to_string(value)?;
        let hash = content_hash(&content);

        let existing: Option<Config> = sqlx::query_as(
            r#"
            SELECT id, app_name, key, content, content_hash
            FROM config
            WHERE content_hash = ? AND app_name IS ? AND key IS ?
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(&hash)
        .bind(app_name)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        if let Some(config) = existing {
            return Ok(config);
        }

        let id = sqlx::query(
            "INSERT INTO config (app_name, key, content, content_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(app_name)
        .bind(key)
        .bind(&content)
        .bind(&hash)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(Config {
            id,
            app_name: app_name.map(str::to_string),
            key: key.map(str::to_string),
            content,
            content_hash: hash,
        })
    }

    /// Remove every row of exactly this scope
    pub async fn delete(&self, app_name: Option<&str>, key: Option<&str>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM config WHERE app_name IS ? AND key IS ?")
            .bind(app_name)
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self) -> Result<Vec<Config>> {
        Ok(sqlx::query_as(
            "SELECT id, app_name, key, content, content_hash FROM config ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?)
    }
}
