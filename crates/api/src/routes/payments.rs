use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::escrow;
use taskbay_core::policy::{self, Action, Resource};

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn payment_routes() -> Router<GlobalState> {
    Router::new()
        .route("/bookings/{booking_id}/payment",
            post(create_payment_intent)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/payments/{payment_id}",
            get(get_payment)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/payments/{payment_id}/release",
            post(release_payment)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/payments/{payment_id}/refund",
            post(refund_payment)
                .route_layer(middleware::from_fn(authenticate))
        )
}

async fn create_payment_intent(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Payment, Action::Create)?;

    let (payment, client_secret) = escrow::create_payment_intent(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        booking_id,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::CREATED,
        "Payment intent created",
        json!({ "payment": payment, "clientSecret": client_secret }),
    ))
}

async fn get_payment(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(payment_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Payment, Action::Read)?;
    policy::ensure_owner(state.db.get_client(), &user, Resource::Payment, payment_id).await?;

    let payment = escrow::get_payment(state.db.get_client(), &user, payment_id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Payment fetched", json!(payment)))
}

async fn release_payment(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(payment_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Payment, Action::Release)?;

    let payment = escrow::release_payment(state.db.get_client(), &user, payment_id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Payment released", json!(payment)))
}

async fn refund_payment(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(payment_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Payment, Action::Refund)?;

    let payment = escrow::refund_payment(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        payment_id,
    )
    .await?;
    Ok(AppSuccess::new(StatusCode::OK, "Payment refunded", json!(payment)))
}
