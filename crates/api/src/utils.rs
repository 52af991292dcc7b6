use anyhow::anyhow;
use axum::extract::Request;
use axum::http::{header, StatusCode};

use crate::response::AppError;

pub fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| {
            AppError::new(StatusCode::UNAUTHORIZED, anyhow!("missing authorization header"))
        })?
        .to_str()
        .map_err(|e| AppError::new(StatusCode::UNAUTHORIZED, anyhow!(e)))?;

    match header_value.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["Bearer", token] => Ok((*token).to_string()),
        _ => Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            anyhow!("invalid authorization header"),
        )),
    }
}

pub fn setup_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
