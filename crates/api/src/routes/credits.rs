use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::policy::{self, Action, Resource};
use taskbay_core::{credits, subscription, CREDIT_PACKAGES};

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn credit_routes() -> Router<GlobalState> {
    Router::new()
        .route("/credits",
            get(get_credits)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/credits/packages",
            get(list_packages)
        )
        .route("/credits/packages/{package_id}/checkout",
            post(create_package_checkout)
                .route_layer(middleware::from_fn(authenticate))
        )
}

async fn get_credits(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::CreditLedger, Action::Read)?;

    let history = credits::list_transactions(state.db.get_client().as_ref(), user.id, 50).await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Credits fetched",
        json!({ "credits": user.credits, "transactions": history }),
    ))
}

async fn list_packages() -> Result<AppSuccess, AppError> {
    Ok(AppSuccess::new(StatusCode::OK, "Packages fetched", json!(CREDIT_PACKAGES)))
}

async fn create_package_checkout(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(package_id): Path<String>,
    headers: HeaderMap,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;

    let origin = headers
        .get("origin")
        .and_then(|o| o.to_str().ok())
        .unwrap_or("http://localhost:3000");
    let success_url = format!("{}/credits?status=success", origin);
    let cancel_url = format!("{}/credits?status=cancelled", origin);

    let url = subscription::create_credit_checkout(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        &package_id,
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
