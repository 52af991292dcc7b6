use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::PgExecutor;
use strum_macros::{Display, EnumString};

use crate::error::CoreError;
use crate::plans::PlanKind;
use crate::refs::HasId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Customer,
    Provider,
    Admin,
}

/// Marketplace account. `credits` is written exclusively by the ledger
/// operations in [`crate::credits`]; the subscription fields are written
/// exclusively by the billing webhook path.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub credits: i64,
    pub subscription_type: Option<PlanKind>,
    pub subscription_status: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subscription-facing slice of a user row, applied as one write by the
/// webhook handlers. `None` fields clear their columns, which is what a
/// deleted subscription needs.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionProfile {
    pub subscription_type: Option<PlanKind>,
    pub subscription_status: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub stripe_subscription_id: Option<String>,
}

impl HasId for User {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

impl User {
    pub fn new(email: String, display_name: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            role,
            credits: 0,
            subscription_type: None,
            subscription_status: None,
            trial_ends_at: None,
            next_billing_date: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create<'e, E: PgExecutor<'e>>(self, executor: E) -> Result<User, CoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, email, display_name, role, credits,
                subscription_type, subscription_status, trial_ends_at, next_billing_date,
                stripe_customer_id, stripe_subscription_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.email)
        .bind(&self.display_name)
        .bind(self.role)
        .bind(self.credits)
        .bind(self.subscription_type)
        .bind(&self.subscription_status)
        .bind(self.trial_ends_at)
        .bind(self.next_billing_date)
        .bind(&self.stripe_customer_id)
        .bind(&self.stripe_subscription_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<User>, CoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
    ) -> Result<Option<User>, CoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(executor)
            .await?;
        Ok(user)
    }

    pub async fn find_by_stripe_customer_id<'e, E: PgExecutor<'e>>(
        executor: E,
        stripe_customer_id: &str,
    ) -> Result<Option<User>, CoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE stripe_customer_id = $1")
            .bind(stripe_customer_id)
            .fetch_optional(executor)
            .await?;
        Ok(user)
    }

    pub async fn set_stripe_customer_id<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<User, CoreError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(stripe_customer_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
        Ok(user)
    }

    pub async fn apply_subscription_profile<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        profile: &SubscriptionProfile,
    ) -> Result<User, CoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                subscription_type = $1,
                subscription_status = $2,
                trial_ends_at = $3,
                next_billing_date = $4,
                stripe_subscription_id = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(profile.subscription_type)
        .bind(&profile.subscription_status)
        .bind(profile.trial_ends_at)
        .bind(profile.next_billing_date)
        .bind(&profile.stripe_subscription_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
        Ok(user)
    }
}
