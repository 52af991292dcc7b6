use anyhow::anyhow;
use axum::body::Body;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::{extract::Request, response::Response};
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::User;

use crate::response::AppError;
use crate::utils::extract_bearer_token;
use crate::GlobalState;

/// Resolves the bearer token to a user id and stashes it in the request
/// extensions for handlers to pick up.
pub async fn authenticate(
    mut req: Request, next: Next
) -> Result<Response<Body>, AppError> {
    let token = extract_bearer_token(&req)?;
    let user_id = Uuid::parse_str(&token)
        .map_err(|_| AppError::new(StatusCode::UNAUTHORIZED, anyhow!("invalid bearer token")))?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// Loads the authenticated principal's account row. Handlers need the role
/// and balances, not just the id the middleware extracted.
pub async fn ensure_account(state: &GlobalState, user_id: Uuid) -> Result<User, AppError> {
    let user = User::find_by_id(state.db.get_client().as_ref(), user_id)
        .await?
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                anyhow!("[ensure_account] unknown account"),
            )
        })?;
    Ok(user)
}
