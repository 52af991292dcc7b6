use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{PgExecutor, PgPool};

use crate::credits::{self, CreditTransactionKind};
use crate::error::CoreError;
use crate::gateway::{CheckoutMode, CheckoutParams, GatewaySubscription, PaymentGateway};
use crate::plans::{self, Plan, PlanKind, PlanPrices};
use crate::user::{SubscriptionProfile, User, UserRole};

/// Gateway statuses under which a subscriber keeps plan benefits.
const ENTITLED_STATUSES: [&str; 2] = ["active", "trialing"];

fn is_entitled(status: &str) -> bool {
    ENTITLED_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_type: PlanKind,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// One row per gateway subscription; repeated webhook deliveries update
    /// in place.
    async fn upsert<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        subscription_type: PlanKind,
        gw: &GatewaySubscription,
    ) -> Result<Subscription, CoreError> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, subscription_type, stripe_subscription_id, stripe_customer_id,
                status, cancel_at_period_end, current_period_start, current_period_end,
                trial_start, trial_end, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                subscription_type = EXCLUDED.subscription_type,
                status = EXCLUDED.status,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(subscription_type)
        .bind(&gw.id)
        .bind(&gw.customer_id)
        .bind(&gw.status)
        .bind(gw.cancel_at_period_end)
        .bind(gw.current_period_start)
        .bind(gw.current_period_end)
        .bind(gw.trial_start)
        .bind(gw.trial_end)
        .fetch_one(executor)
        .await?;
        Ok(sub)
    }

    pub async fn find_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, CoreError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await?;
        Ok(sub)
    }
}

/// Returns the user's gateway customer id, creating the customer on first
/// use and caching the id on the account.
pub async fn ensure_stripe_customer(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
) -> Result<String, CoreError> {
    if let Some(id) = &user.stripe_customer_id {
        return Ok(id.clone());
    }
    let customer_id = gateway.create_customer(&user.email, &user.display_name).await?;
    User::set_stripe_customer_id(pool, user.id, &customer_id).await?;
    tracing::info!(
        "[ensure_stripe_customer] customer {} created for user {}",
        customer_id,
        user.id
    );
    Ok(customer_id)
}

/// Opens a gateway checkout for a subscription plan and returns the hosted
/// page url the frontend redirects to.
pub async fn create_subscription_checkout(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    prices: &PlanPrices,
    user: &User,
    kind: PlanKind,
    success_url: String,
    cancel_url: String,
) -> Result<String, CoreError> {
    if user.role != UserRole::Customer {
        return Err(CoreError::Forbidden("subscription"));
    }
    if let (Some(current), Some(status)) = (user.subscription_type, &user.subscription_status) {
        if is_entitled(status) {
            return Err(CoreError::invalid_state(format!(
                "already subscribed to the {current} plan"
            )));
        }
    }

    let plan = plans::plan(kind);
    let customer_id = ensure_stripe_customer(pool, gateway, user).await?;
    let metadata = std::collections::HashMap::from([
        ("user_id".to_string(), user.id.to_string()),
        ("plan".to_string(), plan.kind.to_string()),
    ]);
    let session = gateway
        .create_checkout_session(CheckoutParams {
            customer_id: Some(customer_id),
            customer_email: None,
            client_reference_id: Some(user.id.to_string()),
            price_id: prices.price_id(kind).to_string(),
            mode: CheckoutMode::Subscription,
            success_url,
            cancel_url,
            metadata,
            allow_promotion_codes: true,
        })
        .await?;
    session
        .url
        .ok_or_else(|| CoreError::gateway("checkout session has no url"))
}

/// Opens a one-off checkout for a credit package.
pub async fn create_credit_checkout(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
    package_id: &str,
    success_url: String,
    cancel_url: String,
) -> Result<String, CoreError> {
    if user.role != UserRole::Customer {
        return Err(CoreError::Forbidden("credit package"));
    }
    let package = plans::find_package(package_id).ok_or(CoreError::NotFound("credit package"))?;

    let customer_id = ensure_stripe_customer(pool, gateway, user).await?;
    let metadata = std::collections::HashMap::from([
        ("user_id".to_string(), user.id.to_string()),
        ("package_id".to_string(), package.id.to_string()),
    ]);
    let session = gateway
        .create_checkout_session(CheckoutParams {
            customer_id: Some(customer_id),
            customer_email: None,
            client_reference_id: Some(user.id.to_string()),
            price_id: package.stripe_price_id.to_string(),
            mode: CheckoutMode::Payment,
            success_url,
            cancel_url,
            metadata,
            allow_promotion_codes: true,
        })
        .await?;
    session
        .url
        .ok_or_else(|| CoreError::gateway("checkout session has no url"))
}

fn subscription_profile(gw: &GatewaySubscription, plan: &Plan) -> SubscriptionProfile {
    if is_entitled(&gw.status) {
        SubscriptionProfile {
            subscription_type: Some(plan.kind),
            subscription_status: Some(gw.status.clone()),
            trial_ends_at: gw.trial_end,
            next_billing_date: gw.current_period_end,
            stripe_subscription_id: Some(gw.id.clone()),
        }
    } else {
        // Lapsed or cancelled: benefits stop, but the status and gateway id
        // stay on record.
        SubscriptionProfile {
            subscription_type: None,
            subscription_status: Some(gw.status.clone()),
            trial_ends_at: None,
            next_billing_date: None,
            stripe_subscription_id: Some(gw.id.clone()),
        }
    }
}

/// Mirrors a gateway subscription into the database: upserts the
/// subscription row, rewrites the user's plan fields, and grants the plan's
/// initial credits exactly once per subscription. Safe to call for created,
/// updated, and deleted events alike.
pub async fn sync_subscription(
    pool: &PgPool,
    prices: &PlanPrices,
    gw: &GatewaySubscription,
) -> Result<User, CoreError> {
    let user = User::find_by_stripe_customer_id(pool, &gw.customer_id)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
    let price_id = gw
        .price_id
        .as_deref()
        .ok_or_else(|| CoreError::validation(format!("subscription {} has no price", gw.id)))?;
    let kind = prices
        .kind_for_price(price_id)
        .ok_or_else(|| CoreError::validation(format!("no plan for price {price_id}")))?;
    let plan = plans::plan(kind);

    let profile = subscription_profile(gw, plan);
    let mut tx = pool.begin().await?;
    Subscription::upsert(&mut *tx, user.id, plan.kind, gw).await?;
    let mut updated = User::apply_subscription_profile(&mut *tx, user.id, &profile).await?;
    if is_entitled(&gw.status) {
        if let Some(after_grant) = credits::grant_credits_once(
            &mut tx,
            user.id,
            plan.initial_credits,
            CreditTransactionKind::Subscription,
            format!("Subscription started: {}", plan.kind),
            &gw.id,
        )
        .await?
        {
            updated = after_grant;
        }
    }
    tx.commit().await?;

    tracing::info!(
        "[sync_subscription] subscription {} for user {} is {}",
        gw.id,
        user.id,
        gw.status
    );
    Ok(updated)
}

/// Grants the monthly credit allowance for a paid invoice, keyed on the
/// invoice id. The invoice raised at subscription creation must not reach
/// this path; its credits come from [`sync_subscription`].
pub async fn grant_renewal_credits(
    pool: &PgPool,
    customer_id: &str,
    invoice_id: &str,
) -> Result<Option<User>, CoreError> {
    let user = User::find_by_stripe_customer_id(pool, customer_id)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
    let Some(kind) = user.subscription_type else {
        tracing::warn!(
            "[grant_renewal_credits] user {} has no plan on record for invoice {}",
            user.id,
            invoice_id
        );
        return Ok(None);
    };
    let plan = plans::plan(kind);

    let mut tx = pool.begin().await?;
    let granted = credits::grant_credits_once(
        &mut tx,
        user.id,
        plan.recurring_credits,
        CreditTransactionKind::Subscription,
        format!("Monthly credits: {}", plan.kind),
        invoice_id,
    )
    .await?;
    tx.commit().await?;
    Ok(granted)
}

/// Grants a purchased credit package, keyed on the checkout session id so a
/// replayed webhook cannot grant twice.
pub async fn apply_credit_purchase(
    pool: &PgPool,
    user_id: Uuid,
    session_id: &str,
    package_id: &str,
) -> Result<Option<User>, CoreError> {
    let package = plans::find_package(package_id).ok_or(CoreError::NotFound("credit package"))?;

    let mut tx = pool.begin().await?;
    let granted = credits::grant_credits_once(
        &mut tx,
        user_id,
        package.credits,
        CreditTransactionKind::Purchase,
        format!("Credit package: {}", package.name),
        session_id,
    )
    .await?;
    tx.commit().await?;
    Ok(granted)
}

/// Flags the subscription to lapse at period end. Benefits continue until
/// then; the eventual deletion webhook clears them.
pub async fn cancel_subscription(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    prices: &PlanPrices,
    user: &User,
) -> Result<GatewaySubscription, CoreError> {
    let sub_id = user
        .stripe_subscription_id
        .as_deref()
        .ok_or_else(|| CoreError::invalid_state("no subscription on record"))?;
    let updated = gateway.set_cancel_at_period_end(sub_id, true).await?;
    sync_subscription(pool, prices, &updated).await?;
    Ok(updated)
}

/// Clears a pending cancellation before the period ends.
pub async fn resume_subscription(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    prices: &PlanPrices,
    user: &User,
) -> Result<GatewaySubscription, CoreError> {
    let sub_id = user
        .stripe_subscription_id
        .as_deref()
        .ok_or_else(|| CoreError::invalid_state("no subscription on record"))?;
    let updated = gateway.set_cancel_at_period_end(sub_id, false).await?;
    sync_subscription(pool, prices, &updated).await?;
    Ok(updated)
}

pub async fn get_subscription(
    pool: &PgPool,
    user: &User,
) -> Result<Option<Subscription>, CoreError> {
    Subscription::find_by_user(pool, user.id).await
}
