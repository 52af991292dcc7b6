use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::policy::{self, Action, Resource};
use taskbay_core::{subscription, PlanKind, PLANS};

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn subscription_routes() -> Router<GlobalState> {
    Router::new()
        .route("/subscription/plans",
            get(list_plans)
        )
        .route("/subscription",
            get(get_subscription)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/subscription/checkout",
            post(create_checkout)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/subscription/cancel",
            post(cancel)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/subscription/resume",
            post(resume)
                .route_layer(middleware::from_fn(authenticate))
        )
}

async fn list_plans() -> Result<AppSuccess, AppError> {
    Ok(AppSuccess::new(StatusCode::OK, "Plans fetched", json!(PLANS)))
}

async fn get_subscription(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Subscription, Action::Read)?;

    let sub = subscription::get_subscription(state.db.get_client(), &user).await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Subscription fetched",
        json!({
            "subscription": sub,
            "subscriptionType": user.subscription_type,
            "subscriptionStatus": user.subscription_status,
            "trialEndsAt": user.trial_ends_at,
            "nextBillingDate": user.next_billing_date,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCheckoutRequest {
    pub plan: PlanKind,
}

async fn create_checkout(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SubscriptionCheckoutRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Subscription, Action::Checkout)?;

    let origin = headers
        .get("origin")
        .and_then(|o| o.to_str().ok())
        .unwrap_or("http://localhost:3000");
    let success_url = format!("{}/subscription?status=success", origin);
    let cancel_url = format!("{}/subscription?status=cancelled", origin);

    let url = subscription::create_subscription_checkout(
        state.db.get_client(),
        state.gateway.as_ref(),
        &state.plan_prices,
        &user,
        payload.plan,
        success_url,
        cancel_url,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Checkout session created",
        json!({ "url": url }),
    ))
}

async fn cancel(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Subscription, Action::Update)?;

    let updated = subscription::cancel_subscription(
        state.db.get_client(),
        state.gateway.as_ref(),
        &state.plan_prices,
        &user,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Subscription set to cancel at period end",
        json!({ "status": updated.status, "cancelAtPeriodEnd": updated.cancel_at_period_end }),
    ))
}

async fn resume(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Subscription, Action::Update)?;

    let updated = subscription::resume_subscription(
        state.db.get_client(),
        state.gateway.as_ref(),
        &state.plan_prices,
        &user,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Subscription resumed",
        json!({ "status": updated.status, "cancelAtPeriodEnd": updated.cancel_at_period_end }),
    ))
}
