use thiserror::Error;

/// Failure classes for the payments core. The HTTP layer maps each variant to a
/// status code; the balance-precondition variants carry the figures callers
/// need to surface a top-up prompt.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized to access this {0}")]
    Forbidden(&'static str),

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        CoreError::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        CoreError::Gateway(msg.into())
    }
}
