use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::policy::{self, Action, Resource};
use taskbay_core::wallet;

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn wallet_routes() -> Router<GlobalState> {
    Router::new()
        .route("/wallet",
            get(get_wallet)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/wallet/deposit",
            post(start_deposit)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/wallet/deposit/confirm",
            post(confirm_deposit)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/wallet/withdraw",
            post(withdraw)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/wallet/connect",
            post(connect_bank_account)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/wallet/connect/status",
            get(connect_status)
                .route_layer(middleware::from_fn(authenticate))
        )
}

async fn get_wallet(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Read)?;

    let (wallet, transactions) = wallet::get_wallet_overview(state.db.get_client(), &user).await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Wallet fetched",
        json!({ "wallet": wallet, "transactions": transactions }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub amount_cents: i64,
}

async fn start_deposit(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<DepositRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Deposit)?;

    let intent = wallet::start_deposit(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        payload.amount_cents,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::CREATED,
        "Deposit started",
        json!({ "paymentIntentId": intent.id, "clientSecret": intent.client_secret }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDepositRequest {
    pub payment_intent_id: String,
}

async fn confirm_deposit(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<ConfirmDepositRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Deposit)?;

    let (wallet, transaction) = wallet::confirm_deposit(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        &payload.payment_intent_id,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Deposit recorded",
        json!({ "wallet": wallet, "transaction": transaction }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub amount_cents: i64,
}

async fn withdraw(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<WithdrawRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Withdraw)?;

    let (wallet, transaction) = wallet::withdraw(
        state.db.get_client(),
        state.gateway.as_ref(),
        &user,
        payload.amount_cents,
    )
    .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Withdrawal sent",
        json!({ "wallet": wallet, "transaction": transaction }),
    ))
}

async fn connect_bank_account(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Connect)?;

    let onboarding_url =
        wallet::connect_bank_account(state.db.get_client(), state.gateway.as_ref(), &user).await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Onboarding link created",
        json!({ "url": onboarding_url }),
    ))
}

async fn connect_status(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Wallet, Action::Read)?;

    let wallet =
        wallet::refresh_connect_status(state.db.get_client(), state.gateway.as_ref(), &user).await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Connect status refreshed",
        json!({ "bankAccountConnected": wallet.bank_account_connected, "wallet": wallet }),
    ))
}
