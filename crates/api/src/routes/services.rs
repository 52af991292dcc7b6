use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::policy::{self, Action, Resource};
use taskbay_core::{CoreError, Service};

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn service_routes() -> Router<GlobalState> {
    Router::new()
        .route("/services",
            get(list_services)
        )
        .route("/services",
            post(create_service)
                .route_layer(middleware::from_fn(authenticate))
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
}

async fn list_services(State(state): State<GlobalState>) -> Result<AppSuccess, AppError> {
    let services = Service::list_active(state.db.get_client().as_ref()).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Services fetched", json!(services)))
}

async fn create_service(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Service, Action::Create)?;
    if payload.title.trim().is_empty() {
        return Err(CoreError::validation("title is required").into());
    }
    if payload.price_cents <= 0 {
        return Err(CoreError::validation("priceCents must be positive").into());
    }

    let service = Service::new(user.id, payload.title, payload.description, payload.price_cents)
        .create(state.db.get_client().as_ref())
        .await?;

    Ok(AppSuccess::new(StatusCode::CREATED, "Service listed", json!(service)))
}
