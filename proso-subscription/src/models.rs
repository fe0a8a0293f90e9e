//! Subscription entities and their serialized form

use chrono::NaiveDateTime;
use proso_common::{Record, Result, ToRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

pub const PLAN_TYPE: &str = "subscription_plan";
pub const PLAN_DESCRIPTION_TYPE: &str = "subscription_plan_description";
pub const SUBSCRIPTION_TYPE: &str = "subscription_subscription";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub identifier: String,
    pub months_validity: i64,
    pub months_referral: i64,
    #[sqlx(rename = "type")]
    pub plan_type: String,
    pub active: bool,
    pub featured: bool,
}

impl ToRecord for SubscriptionPlan {
    fn to_record(&self, _nested: bool) -> Result<Record> {
        Record::from_json(
            PLAN_TYPE,
            self.id,
            json!({
                "identifier": self.identifier,
                "type": self.plan_type,
                "featured": self.featured,
                "active": self.active,
                "months-validity": self.months_validity,
                "months-referral": self.months_referral,
            }),
        )
    }
}

/// Localized name and price of a plan
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SubscriptionPlanDescription {
    pub id: i64,
    pub plan_id: i64,
    pub lang: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    #[sqlx(skip)]
    pub plan: Option<SubscriptionPlan>,
}

impl ToRecord for SubscriptionPlanDescription {
    fn to_record(&self, nested: bool) -> Result<Record> {
        let mut fields = json!({
            "lang": self.lang,
            "price": self.price,
            "currency": self.currency,
            "description": self.description,
            "name": self.name,
        });
        match (&self.plan, nested) {
            (Some(plan), false) => fields["plan"] = plan.to_record(true)?.into_json(),
            _ => fields["plan_id"] = json!(self.plan_id),
        }
        Record::from_json(PLAN_DESCRIPTION_TYPE, self.id, fields)
    }
}

/// Plan with all of its descriptions
#[derive(Debug, Clone, PartialEq)]
pub struct PlanWithDescriptions {
    pub plan: SubscriptionPlan,
    pub descriptions: Vec<SubscriptionPlanDescription>,
}

impl ToRecord for PlanWithDescriptions {
    fn to_record(&self, nested: bool) -> Result<Record> {
        let record = self.plan.to_record(nested)?;
        if nested {
            return Ok(record);
        }
        let descriptions = self
            .descriptions
            .iter()
            .map(|d| d.to_record(true))
            .collect::<Result<Vec<_>>>()?;
        Ok(record.with_children("descriptions", descriptions))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_description_id: i64,
    pub order_number: String,
    pub created: NaiveDateTime,
    pub expiration: NaiveDateTime,
    #[sqlx(skip)]
    pub plan_description: Option<SubscriptionPlanDescription>,
}

impl Subscription {
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.expiration > now
    }
}

impl ToRecord for Subscription {
    fn to_record(&self, nested: bool) -> Result<Record> {
        let mut fields = json!({
            "expiration": self.expiration.format(TIME_FORMAT).to_string(),
            "created": self.created.format(TIME_FORMAT).to_string(),
            "order_number": self.order_number,
            "user_id": self.user_id,
        });
        match (&self.plan_description, nested) {
            (Some(description), false) => {
                fields["plan_description"] = description.to_record(false)?.into_json();
            }
            _ => fields["plan_description_id"] = json!(self.plan_description_id),
        }
        Record::from_json(SUBSCRIPTION_TYPE, self.id, fields)
    }
}

/// Input of [`crate::PlanStore::create_plan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlan {
    pub identifier: String,
    pub months_validity: i64,
    #[serde(default)]
    pub months_referral: i64,
    #[serde(rename = "type")]
    pub plan_type: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub featured: bool,
}

fn default_active() -> bool {
    true
}

/// Input of [`crate::PlanStore::add_description`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlanDescription {
    pub lang: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn plan() -> SubscriptionPlan {
        SubscriptionPlan {
            id: 1,
            identifier: "yearly".into(),
            months_validity: 12,
            months_referral: 0,
            plan_type: "premium".into(),
            active: true,
            featured: false,
        }
    }

    fn description(plan: Option<SubscriptionPlan>) -> SubscriptionPlanDescription {
        SubscriptionPlanDescription {
            id: 5,
            plan_id: 1,
            lang: "en".into(),
            name: "Yearly".into(),
            description: "One year".into(),
            price: 100,
            currency: "EUR".into(),
            plan,
        }
    }

    #[test]
    fn test_plan_record_uses_dashed_months() {
        let json = plan().to_record(false).unwrap().into_json();
        assert_eq!(json["object_type"], PLAN_TYPE);
        assert_eq!(json["months-validity"], 12);
        assert_eq!(json["type"], "premium");
    }

    #[test]
    fn test_description_nested_or_embedded() {
        let nested = description(Some(plan())).to_record(true).unwrap().into_json();
        assert_eq!(nested["plan_id"], 1);
        assert!(nested.get("plan").is_none());

        let top = description(Some(plan())).to_record(false).unwrap().into_json();
        assert_eq!(top["plan"]["identifier"], "yearly");

        let unloaded = description(None).to_record(false).unwrap().into_json();
        assert_eq!(unloaded["plan_id"], 1);
    }

    #[test]
    fn test_plan_with_descriptions_children() {
        let plan = PlanWithDescriptions {
            plan: plan(),
            descriptions: vec![description(None)],
        };
        let json = plan.to_record(false).unwrap().into_json();
        assert_eq!(json["descriptions"][0]["object_type"], PLAN_DESCRIPTION_TYPE);
        assert_eq!(json["descriptions"][0]["plan_id"], 1);
    }

    #[test]
    fn test_subscription_activity() {
        let at = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let subscription = Subscription {
            id: 1,
            user_id: 2,
            plan_description_id: 5,
            order_number: "abc".into(),
            created: at(1),
            expiration: at(10),
            plan_description: None,
        };
        assert!(subscription.is_active_at(at(5)));
        assert!(!subscription.is_active_at(at(10)));

        let json = subscription.to_record(false).unwrap().into_json();
        assert_eq!(json["expiration"], "2024-01-10 00:00:00");
        assert_eq!(json["plan_description_id"], 5);
    }

    #[test]
    fn test_new_plan_defaults() {
        let plan: NewPlan = serde_json::from_value(json!({
            "identifier": "monthly",
            "months_validity": 1,
            "type": "premium"
        }))
        .unwrap();
        assert!(plan.active);
        assert!(!plan.featured);
        assert_eq!(plan.months_referral, 0);
    }
}
