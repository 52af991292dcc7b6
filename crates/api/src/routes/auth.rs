use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::credits;
use taskbay_core::{CoreError, CreditTransactionKind, User, UserRole, REGISTRATION_BONUS_CREDITS};

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn auth_routes() -> Router<GlobalState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/me",
            get(me)
                .route_layer(middleware::from_fn(authenticate))
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
}

async fn register(
    State(state): State<GlobalState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<AppSuccess, AppError> {
    if payload.role == UserRole::Admin {
        return Err(CoreError::validation("admin accounts are provisioned, not registered").into());
    }
    if payload.email.trim().is_empty() || payload.display_name.trim().is_empty() {
        return Err(CoreError::validation("email and displayName are required").into());
    }
    if User::find_by_email(state.db.get_client().as_ref(), &payload.email)
        .await?
        .is_some()
    {
        return Err(CoreError::validation("email is already registered").into());
    }

    let mut tx = state.db.get_client().begin().await?;
    let mut user = User::new(payload.email, payload.display_name, payload.role)
        .create(&mut *tx)
        .await?;
    if user.role == UserRole::Customer {
        user = credits::grant_credits(
            &mut tx,
            user.id,
            REGISTRATION_BONUS_CREDITS,
            CreditTransactionKind::Adjustment,
            "Welcome bonus".to_string(),
            None,
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!("[register] {} account created for {}", user.role, user.id);
    Ok(AppSuccess::new(StatusCode::CREATED, "Account registered", json!(user)))
}

async fn me(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Account fetched", json!(user)))
}
