//! Integration tests for database initialization
//!
//! Tests cover:
//! - Automatic database creation on first run
//! - Re-opening an existing database
//! - Schema version bookkeeping

use proso_common::db::init::init_database;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("proso.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("proso.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO config (content, content_hash) VALUES ('1', 'h')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM config")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive re-initialization");
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("proso.db")).await.unwrap();

    for table in [
        "config",
        "answer",
        "configab_experiment",
        "configab_variable",
        "configab_possible_value",
        "configab_experiment_setup",
        "configab_experiment_setup_values",
        "configab_user_setup",
        "configab_answer_experiment_setup",
        "subscription_plan",
        "subscription_plan_description",
        "subscription",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "Table {} missing", table);
    }
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("proso.db")).await.unwrap();

    let version: i32 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, 2);
}
