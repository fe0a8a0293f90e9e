//! Users' subscriptions

use crate::models::Subscription;
use crate::plans::PlanStore;
use chrono::{Months, NaiveDateTime, Utc};
use proso_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    db: SqlitePool,
    plans: PlanStore,
}

impl SubscriptionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            plans: PlanStore::new(db.clone()),
            db,
        }
    }

    /// Subscribe the user to a plan description
    ///
    /// The subscription expires after the plan's months of validity.
    pub async fn subscribe(&self, user_id: i64, description_id: i64) -> Result<Subscription> {
        self.subscribe_at(user_id, description_id, Utc::now().naive_utc()).await
    }

    async fn subscribe_at(&self, user_id: i64, description_id: i64, now: NaiveDateTime) -> Result<Subscription> {
        let description = self.plans.get_description(description_id).await?;
        let plan = description.plan.as_ref().ok_or_else(|| {
            Error::Internal(format!("Plan of description {} not loaded", description_id))
        })?;
        if !plan.active {
            return Err(Error::InvalidInput(format!(
                "Subscription plan '{}' is not active",
                plan.identifier
            )));
        }

        let months = u32::try_from(plan.months_validity)
            .map_err(|_| Error::Internal(format!("Plan '{}' has invalid validity", plan.identifier)))?;
        let expiration = now.checked_add_months(Months::new(months)).ok_or_else(|| {
            Error::Internal(format!("Expiration of plan '{}' out of range", plan.identifier))
        })?;
        let order_number = Uuid::new_v4().to_string();

        let id = sqlx::query(
            r#"
            INSERT INTO subscription (user_id, plan_description_id, order_number, created, expiration)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(description_id)
        .bind(&order_number)
        .bind(now)
        .bind(expiration)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!(
            "User {} subscribed to '{}' until {}",
            user_id, plan.identifier, expiration
        );
        Ok(Subscription {
            id,
            user_id,
            plan_description_id: description_id,
            order_number,
            created: now,
            expiration,
            plan_description: Some(description),
        })
    }

    /// Subscriptions of the user, newest first, with their descriptions
    pub async fn for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT id, user_id, plan_description_id, order_number, created, expiration
            FROM subscription
            WHERE user_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut ids: Vec<i64> = subscriptions.iter().map(|s| s.plan_description_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let descriptions = self.plans.descriptions_by_ids(&ids).await?;
        for subscription in subscriptions.iter_mut() {
            subscription.plan_description = descriptions.get(&subscription.plan_description_id).cloned();
        }
        Ok(subscriptions)
    }

    /// True when the user has an unexpired subscription of the plan type
    pub async fn is_active(&self, user_id: i64, plan_type: &str) -> Result<bool> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM subscription s
                INNER JOIN subscription_plan_description d ON d.id = s.plan_description_id
                INNER JOIN subscription_plan p ON p.id = d.plan_id
                WHERE s.user_id = ? AND p.type = ? AND s.expiration >= ?
            )
            "#,
        )
        .bind(user_id)
        .bind(plan_type)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.db)
        .await?)
    }
}
