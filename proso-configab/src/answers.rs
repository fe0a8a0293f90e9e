//! Answer log linked to experiment setups

use chrono::Utc;
use proso_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AnswerLog {
    db: SqlitePool,
}

impl AnswerLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Store an answer and link it to the user's setups in enabled experiments
    ///
    /// Returns the id of the new answer.
    pub async fn record(&self, user_id: i64, session_id: Option<i64>, config_id: Option<i64>) -> Result<i64> {
        let mut tx = self.db.begin().await?;

        let answer_id = sqlx::query(
            "INSERT INTO answer (user_id, session_id, config_id, time) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(config_id)
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let linked = sqlx::query(
            r#"
            INSERT INTO configab_answer_experiment_setup (answer_id, experiment_setup_id)
            SELECT ?, us.experiment_setup_id
            FROM configab_user_setup us
            INNER JOIN configab_experiment_setup s ON s.id = us.experiment_setup_id
            INNER JOIN configab_experiment e ON e.id = s.experiment_id
            WHERE us.user_id = ? AND e.is_enabled = 1
            "#,
        )
        .bind(answer_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        debug!(
            "Answer {} of user {} linked to {} experiment setups",
            answer_id, user_id, linked
        );
        Ok(answer_id)
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM answer WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?)
    }
}
