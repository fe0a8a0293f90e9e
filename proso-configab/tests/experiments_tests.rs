//! Integration tests for A/B experiments
//!
//! Tests cover:
//! - Experiment creation (variables, values, setups, probabilities)
//! - Setup assignment and the overrides it implies
//! - Answer logging and per-setup statistics

use proso_common::db::init::init_database;
use proso_common::{Error, EnricherRegistry, RequestContext, ToRecord};
use proso_configab::{
    AnswerLog, ExperimentDefinition, ExperimentSetupStats, ExperimentStore, RandomStrategy,
    UserSetupStore,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

async fn setup_db() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("proso.db")).await.unwrap();
    (dir, pool)
}

fn definition(identifier: &str) -> ExperimentDefinition {
    serde_json::from_value(json!({
        "identifier": identifier,
        "variables": [
            {
                "app_name": "proso_models",
                "name": "practice_size",
                "values": [
                    {"value": 10, "probability": 25},
                    {"value": 20, "probability": 75}
                ]
            },
            {
                "app_name": "proso_flashcards",
                "name": "mode",
                "values": [
                    {"value": "fast", "probability": 40},
                    {"value": "slow", "probability": 60}
                ]
            }
        ]
    }))
    .unwrap()
}

fn single_setup_definition(identifier: &str, value: &str) -> ExperimentDefinition {
    serde_json::from_value(json!({
        "identifier": identifier,
        "variables": [{
            "app_name": "proso_tests",
            "name": identifier,
            "values": [{"value": value, "probability": 100}]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_materializes_setups() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);

    let detail = store.create(&definition("practice")).await.unwrap();

    assert_eq!(detail.experiment.identifier, "practice");
    assert!(detail.experiment.is_enabled);
    assert_eq!(detail.variables.len(), 2);
    assert_eq!(detail.setups.len(), 4);

    let total: f64 = detail.setups.iter().map(|s| s.weight()).sum();
    assert!((total - 100.0).abs() < 1e-9);
    for setup in &detail.setups {
        assert_eq!(setup.values.len(), 2);
        assert_eq!(setup.content_hash.len(), 40);
    }

    let mut probabilities: Vec<f64> = detail.setups.iter().map(|s| s.weight()).collect();
    probabilities.sort_by(|a, b| a.total_cmp(b));
    let expected = [10.0, 15.0, 30.0, 45.0];
    for (actual, expected) in probabilities.iter().zip(expected) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }
}

#[tokio::test]
async fn test_create_rejects_invalid_definitions() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);

    store.create(&definition("practice")).await.unwrap();
    assert!(matches!(
        store.create(&definition("practice")).await,
        Err(Error::InvalidInput(_))
    ));

    let bad_sum: ExperimentDefinition = serde_json::from_value(json!({
        "identifier": "bad",
        "variables": [{
            "app_name": "a", "name": "b",
            "values": [{"value": 1, "probability": 30}, {"value": 2, "probability": 30}]
        }]
    }))
    .unwrap();
    assert!(matches!(store.create(&bad_sum).await, Err(Error::InvalidInput(_))));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

fn on_off_definition(on: f64, off: f64) -> ExperimentDefinition {
    serde_json::from_value(json!({
        "identifier": "switch",
        "variables": [{
            "app_name": "proso_tests",
            "name": "switch",
            "values": [
                {"value": "on", "probability": on},
                {"value": "off", "probability": off}
            ]
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_rejects_zero_probability_value() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);

    assert!(matches!(
        store.create(&on_off_definition(100.0, 0.0)).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_weight_setup_does_not_block_assignment() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool.clone());
    let user_setups = UserSetupStore::new(pool.clone());
    experiments.create(&on_off_definition(50.0, 50.0)).await.unwrap();

    // Rows written before weighting existed may carry a zero probability
    let detail = experiments.list().await.unwrap().remove(0);
    let off_setup = detail
        .setups
        .iter()
        .find(|s| s.values.iter().any(|v| v.value == "off"))
        .unwrap()
        .id;
    sqlx::query("UPDATE configab_experiment_setup SET probability = 0 WHERE id = ?")
        .bind(off_setup)
        .execute(&pool)
        .await
        .unwrap();

    let strategy = RandomStrategy::seeded(1);
    for user_id in 1..=20 {
        let values = user_setups.variables_to_override(user_id, &strategy).await.unwrap();
        assert_eq!(values["proso_tests.switch"], "on");
    }
}

#[tokio::test]
async fn test_variables_shared_between_experiments() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);

    let first = store.create(&definition("first")).await.unwrap();
    let second = store.create(&definition("second")).await.unwrap();

    let ids = |d: &proso_configab::ExperimentDetail| {
        let mut ids: Vec<i64> = d.variables.iter().map(|(v, _)| v.id).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_get_list_and_setups() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);
    let created = store.create(&definition("practice")).await.unwrap();
    store.create(&single_setup_definition("other", "x")).await.unwrap();

    let fetched = store.get(created.experiment.id).await.unwrap();
    assert_eq!(fetched, created);
    assert!(matches!(store.get(999).await, Err(Error::NotFound(_))));

    assert_eq!(store.list_setups(None).await.unwrap().len(), 5);
    let own = store.list_setups(Some(created.experiment.id)).await.unwrap();
    assert_eq!(own.len(), 4);
    assert!(own.iter().all(|s| s.experiment.as_ref().map(|e| e.id) == Some(created.experiment.id)));

    let setup = store.get_setup(own[0].id).await.unwrap();
    assert_eq!(setup.values.len(), 2);
    let json = setup.to_record(false).unwrap().into_json();
    assert_eq!(json["experiment"]["identifier"], "practice");
    assert!(matches!(store.get_setup(999).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_disable_and_pause() {
    let (_dir, pool) = setup_db().await;
    let store = ExperimentStore::new(pool);
    let id = store.create(&definition("practice")).await.unwrap().experiment.id;

    let paused = store.pause(id, true).await.unwrap();
    assert!(paused.is_paused);

    let disabled = store.disable(id).await.unwrap();
    assert!(!disabled.is_enabled);
    assert!(disabled.time_disabled.is_some());

    let json = disabled.to_record(false).unwrap().into_json();
    assert!(json["time_disabled"].is_string());

    assert!(matches!(store.pause(999, true).await, Err(Error::NotFound(_))));
    assert!(matches!(store.disable(999).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_new_user_gets_persistent_assignment() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool.clone());
    let user_setups = UserSetupStore::new(pool.clone());
    experiments.create(&definition("practice")).await.unwrap();
    let strategy = RandomStrategy::seeded(3);

    let first = user_setups.variables_to_override(1, &strategy).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(["10", "20"].contains(&first["proso_models.practice_size"].as_str()));
    assert!(["fast", "slow"].contains(&first["proso_flashcards.mode"].as_str()));

    for _ in 0..5 {
        let again = user_setups.variables_to_override(1, &strategy).await.unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(user_setups.for_user(1).await.unwrap().len(), 1);

    let overrides = user_setups.overrides_for_user(1, &strategy).await.unwrap();
    assert!(overrides.get("proso_models.practice_size").unwrap().is_number());
}

#[tokio::test]
async fn test_users_with_answers_are_not_assigned() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool.clone());
    let user_setups = UserSetupStore::new(pool.clone());
    let answers = AnswerLog::new(pool.clone());
    experiments.create(&definition("practice")).await.unwrap();

    answers.record(5, Some(1), None).await.unwrap();
    let variables = user_setups
        .variables_to_override(5, &RandomStrategy::seeded(1))
        .await
        .unwrap();
    assert!(variables.is_empty());
}

#[tokio::test]
async fn test_paused_experiment_keeps_existing_users_only() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool.clone());
    let user_setups = UserSetupStore::new(pool.clone());
    let id = experiments
        .create(&single_setup_definition("paused", "on"))
        .await
        .unwrap()
        .experiment
        .id;
    let strategy = RandomStrategy::seeded(1);

    let existing = user_setups.variables_to_override(1, &strategy).await.unwrap();
    assert_eq!(existing["proso_tests.paused"], "on");

    experiments.pause(id, true).await.unwrap();
    assert_eq!(user_setups.variables_to_override(1, &strategy).await.unwrap(), existing);
    assert!(user_setups.variables_to_override(2, &strategy).await.unwrap().is_empty());

    experiments.disable(id).await.unwrap();
    assert!(user_setups.variables_to_override(1, &strategy).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_aggregate_linked_answers() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool.clone());
    let user_setups = UserSetupStore::new(pool.clone());
    let answers = AnswerLog::new(pool.clone());
    let detail = experiments
        .create(&single_setup_definition("stats", "on"))
        .await
        .unwrap();
    let setup_id = detail.setups[0].id;
    let strategy = RandomStrategy::seeded(1);

    // User 1: 4 answers in 2 sessions, user 2: 3 answers in 1 session, user 3: 1 answer
    for (user, sessions) in [(1, vec![1, 1, 2, 2]), (2, vec![3, 3, 3]), (3, vec![4])] {
        user_setups.variables_to_override(user, &strategy).await.unwrap();
        for session in sessions {
            answers.record(user, Some(session), None).await.unwrap();
        }
    }

    let stats = experiments.get_stats(&[setup_id, 999], 2).await.unwrap();

    let setup_stats = &stats[&setup_id];
    assert_eq!(setup_stats["number_of_users"], 2);
    assert_eq!(setup_stats["number_of_answers"]["value"], 3.5);
    assert_eq!(setup_stats["returning_chance"]["value"], 0.5);

    assert_eq!(
        stats[&999],
        json!({"number_of_users": 0, "number_of_answers": null, "returning_chance": null})
    );
}

#[tokio::test]
async fn test_enricher_uses_stored_stats() {
    let (_dir, pool) = setup_db().await;
    let experiments = ExperimentStore::new(pool);
    let detail = experiments.create(&definition("practice")).await.unwrap();

    let registry = EnricherRegistry::builder()
        .register(
            ExperimentSetupStats::OBJECT_TYPES,
            Arc::new(ExperimentSetupStats::new(Arc::new(experiments.clone()))),
        )
        .build()
        .unwrap();

    let json = registry
        .enrich_json(
            &RequestContext::anonymous(),
            vec![detail.to_record(false).unwrap()],
            false,
        )
        .await
        .unwrap();

    let setups = json[0]["setups"].as_array().unwrap();
    assert_eq!(setups.len(), 4);
    for setup in setups {
        assert_eq!(setup["stats"]["number_of_users"], 0);
    }
    assert!(json[0].get("stats").is_none());
}
