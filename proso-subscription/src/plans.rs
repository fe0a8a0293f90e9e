//! Subscription plans and their descriptions

use crate::models::{
    NewPlan, NewPlanDescription, PlanWithDescriptions, SubscriptionPlan,
    SubscriptionPlanDescription,
};
use proso_common::db::push_ids;
use proso_common::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::info;

const PLAN_COLUMNS: &str = "id, identifier, months_validity, months_referral, type, active, featured";
const DESCRIPTION_COLUMNS: &str = "id, plan_id, lang, name, description, price, currency";

#[derive(Debug, Clone)]
pub struct PlanStore {
    db: SqlitePool,
}

impl PlanStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_plan(&self, plan: &NewPlan) -> Result<SubscriptionPlan> {
        if plan.months_validity <= 0 {
            return Err(Error::InvalidInput(format!(
                "Plan '{}' must be valid for at least one month",
                plan.identifier
            )));
        }
        let id = sqlx::query(
            r#"
            INSERT INTO subscription_plan (identifier, months_validity, months_referral, type, active, featured)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.identifier)
        .bind(plan.months_validity)
        .bind(plan.months_referral)
        .bind(&plan.plan_type)
        .bind(plan.active)
        .bind(plan.featured)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        info!("Subscription plan '{}' created", plan.identifier);
        self.get_plan(id).await
    }

    pub async fn get_plan(&self, id: i64) -> Result<SubscriptionPlan> {
        sqlx::query_as(&format!(
            "SELECT {} FROM subscription_plan WHERE id = ?",
            PLAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Subscription plan {} not found", id)))
    }

    pub async fn add_description(
        &self,
        plan_id: i64,
        description: &NewPlanDescription,
    ) -> Result<SubscriptionPlanDescription> {
        let plan = self.get_plan(plan_id).await?;
        let id = sqlx::query(
            r#"
            INSERT INTO subscription_plan_description (plan_id, lang, name, description, price, currency)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan_id)
        .bind(&description.lang)
        .bind(&description.name)
        .bind(&description.description)
        .bind(description.price)
        .bind(&description.currency)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(SubscriptionPlanDescription {
            id,
            plan_id,
            lang: description.lang.clone(),
            name: description.name.clone(),
            description: description.description.clone(),
            price: description.price,
            currency: description.currency.clone(),
            plan: Some(plan),
        })
    }

    /// Description with its plan
    pub async fn get_description(&self, id: i64) -> Result<SubscriptionPlanDescription> {
        let mut description: SubscriptionPlanDescription = sqlx::query_as(&format!(
            "SELECT {} FROM subscription_plan_description WHERE id = ?",
            DESCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Subscription plan description {} not found", id)))?;
        description.plan = Some(self.get_plan(description.plan_id).await?);
        Ok(description)
    }

    /// Descriptions with their plans, keyed by id; two queries for any number of ids
    pub async fn descriptions_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, SubscriptionPlanDescription>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM subscription_plan_description WHERE id IN (",
            DESCRIPTION_COLUMNS
        ));
        push_ids(&mut query, ids);
        query.push(")");
        let descriptions: Vec<SubscriptionPlanDescription> =
            query.build_query_as().fetch_all(&self.db).await?;

        let plan_ids: Vec<i64> = descriptions.iter().map(|d| d.plan_id).collect();
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM subscription_plan WHERE id IN (",
            PLAN_COLUMNS
        ));
        push_ids(&mut query, &plan_ids);
        query.push(")");
        let plans: HashMap<i64, SubscriptionPlan> = query
            .build_query_as::<SubscriptionPlan>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(|plan| (plan.id, plan))
            .collect();

        Ok(descriptions
            .into_iter()
            .map(|mut description| {
                description.plan = plans.get(&description.plan_id).cloned();
                (description.id, description)
            })
            .collect())
    }

    /// Active plans, each with all of its descriptions
    pub async fn active_plans(&self) -> Result<Vec<PlanWithDescriptions>> {
        let plans: Vec<SubscriptionPlan> = sqlx::query_as(&format!(
            "SELECT {} FROM subscription_plan WHERE active = 1 ORDER BY id",
            PLAN_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let descriptions: Vec<SubscriptionPlanDescription> = sqlx::query_as(
            r#"
            SELECT d.id, d.plan_id, d.lang, d.name, d.description, d.price, d.currency
            FROM subscription_plan_description d
            INNER JOIN subscription_plan p ON p.id = d.plan_id
            WHERE p.active = 1
            ORDER BY d.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut by_plan: HashMap<i64, Vec<SubscriptionPlanDescription>> = HashMap::new();
        for description in descriptions {
            by_plan.entry(description.plan_id).or_default().push(description);
        }

        Ok(plans
            .into_iter()
            .map(|plan| PlanWithDescriptions {
                descriptions: by_plan.remove(&plan.id).unwrap_or_default(),
                plan,
            })
            .collect())
    }
}
