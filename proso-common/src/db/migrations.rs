//! Database schema migrations
//!
//! Versioned migrations bring databases created by older releases up to the
//! current schema without data loss. Tables created from scratch by
//! [`crate::db::init`] already have the current shape, so every migration
//! checks before it changes anything.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    Ok(sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?)
}

/// Add a column unless the table is missing or already has it
///
/// Returns true when the column was added.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    if !table_exists(pool, table).await? {
        info!("  {} table doesn't exist yet - skipping", table);
        return Ok(false);
    }

    let has_column: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if has_column > 0 {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(false);
    }

    let statement = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
    match sqlx::query(&statement).execute(pool).await {
        Ok(_) => {
            info!("  Added {} column to {} table", column, table);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {} column added by concurrent initialization - skipping", column);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v1: scope columns of the config table
///
/// **Background:** The first config table stored only content and its hash.
/// Per-app and per-key overrides need the `app_name` and `key` columns.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add app_name and key columns to config");
    add_column_if_missing(pool, "config", "app_name", "TEXT").await?;
    add_column_if_missing(pool, "config", "key", "TEXT").await?;
    Ok(())
}

/// Migration v2: probability of experiment setups
///
/// **Background:** Setups were originally drawn uniformly. Weighted
/// assignment needs a probability per setup; existing setups of one
/// experiment share the probability mass evenly.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add probability column to configab_experiment_setup");
    let added =
        add_column_if_missing(pool, "configab_experiment_setup", "probability", "REAL DEFAULT 0")
            .await?;

    if added {
        sqlx::query(
            r#"
            UPDATE configab_experiment_setup
            SET probability = 100.0 / (
                SELECT COUNT(*) FROM configab_experiment_setup AS other
                WHERE other.experiment_id IS configab_experiment_setup.experiment_id
            )
            "#,
        )
        .execute(pool)
        .await?;
        info!("  Distributed probability evenly among existing setups");
    }
    Ok(())
}
