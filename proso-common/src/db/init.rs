//! Database initialization
//!
//! Creates the database file when it is missing and brings the schema up to
//! date. Every statement is idempotent, so opening an existing database runs
//! the same code path.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and run pending migrations
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_schema_version_table(pool).await?;
    create_config_table(pool).await?;
    create_answer_table(pool).await?;

    // A/B experiments (proso-configab)
    create_experiment_tables(pool).await?;

    // Subscriptions (proso-subscription)
    create_subscription_tables(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_config_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_name TEXT,
            key TEXT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_config_content_hash ON config(content_hash)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_answer_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS answer (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            session_id INTEGER,
            config_id INTEGER REFERENCES config(id),
            time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_answer_user ON answer(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_experiment_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_experiment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL UNIQUE,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            is_paused INTEGER NOT NULL DEFAULT 0,
            time_disabled TIMESTAMP,
            time_created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_variable (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            app_name TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (app_name, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_possible_value (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            variable_id INTEGER NOT NULL REFERENCES configab_variable(id),
            experiment_id INTEGER NOT NULL REFERENCES configab_experiment(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            UNIQUE (experiment_id, variable_id, value)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_experiment_setup (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            experiment_id INTEGER REFERENCES configab_experiment(id) ON DELETE CASCADE,
            content_hash TEXT NOT NULL,
            probability REAL DEFAULT 0,
            UNIQUE (content_hash, experiment_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_experiment_setup_values (
            experiment_setup_id INTEGER NOT NULL REFERENCES configab_experiment_setup(id) ON DELETE CASCADE,
            possible_value_id INTEGER NOT NULL REFERENCES configab_possible_value(id) ON DELETE CASCADE,
            PRIMARY KEY (experiment_setup_id, possible_value_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_user_setup (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            experiment_setup_id INTEGER NOT NULL REFERENCES configab_experiment_setup(id) ON DELETE CASCADE,
            UNIQUE (user_id, experiment_setup_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configab_answer_experiment_setup (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            answer_id INTEGER NOT NULL REFERENCES answer(id) ON DELETE CASCADE,
            experiment_setup_id INTEGER NOT NULL REFERENCES configab_experiment_setup(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_answer_experiment_setup ON configab_answer_experiment_setup(experiment_setup_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subscription_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscription_plan (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL,
            months_validity INTEGER NOT NULL,
            months_referral INTEGER NOT NULL DEFAULT 0,
            type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            featured INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscription_plan_description (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id INTEGER NOT NULL REFERENCES subscription_plan(id) ON DELETE CASCADE,
            lang TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            price INTEGER NOT NULL,
            currency TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscription (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            plan_description_id INTEGER NOT NULL REFERENCES subscription_plan_description(id),
            order_number TEXT NOT NULL,
            created TIMESTAMP NOT NULL,
            expiration TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
