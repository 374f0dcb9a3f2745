//! Organization model - the tenant boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Organization entity, including the billing references kept in sync by
/// provider webhooks.
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub logo_key: Option<String>,
    pub stripe_account_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_plan: Option<String>,
    pub subscription_period_end_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Last known subscription state, as recorded from provider snapshots.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    pub status: String,
    pub plan: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            organization_id: Uuid::new_v4(),
            name,
            description,
            contact_email: None,
            website_url: None,
            logo_key: None,
            stripe_account_id: None,
            stripe_customer_id: None,
            subscription_status: None,
            subscription_plan: None,
            subscription_period_end_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn subscription(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            status: self
                .subscription_status
                .clone()
                .unwrap_or_else(|| "none".to_string()),
            plan: self.subscription_plan.clone(),
            current_period_end: self.subscription_period_end_utc,
        }
    }
}
