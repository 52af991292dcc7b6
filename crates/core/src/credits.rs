use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{PgExecutor, Postgres, Transaction};
use strum_macros::{Display, EnumString};

use crate::error::CoreError;
use crate::user::User;

/// Credits debited per booking. Hardcoded in the product, not derived from the
/// service price.
pub const BOOKING_CREDIT_COST: i64 = 5;
/// Welcome grant for new customer accounts, enough for exactly one booking.
pub const REGISTRATION_BONUS_CREDITS: i64 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CreditTransactionKind {
    Subscription,
    Purchase,
    Usage,
    Refund,
    Adjustment,
}

/// Append-only ledger entry. Every mutation of `users.credits` writes exactly
/// one of these; the sum of a user's entries equals their balance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: CreditTransactionKind,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        kind: CreditTransactionKind,
        description: String,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            kind,
            description,
            reference,
            created_at: Utc::now(),
        }
    }

    pub async fn create<'e, E: PgExecutor<'e>>(
        self,
        executor: E,
    ) -> Result<CreditTransaction, CoreError> {
        let entry = sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions (id, user_id, amount, kind, description, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(self.amount)
        .bind(self.kind)
        .bind(&self.description)
        .bind(&self.reference)
        .bind(self.created_at)
        .fetch_one(executor)
        .await?;
        Ok(entry)
    }
}

/// Reads the current balance; no side effect.
pub async fn has_enough_credits<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    required: i64,
) -> Result<bool, CoreError> {
    let balance: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
    Ok(balance >= required)
}

/// Decrements the balance and appends the matching negative ledger entry.
///
/// The decrement is conditional on `credits >= amount` so two concurrent
/// deductions cannot overdraw; when it does not apply, the user is looked up
/// to tell "missing" apart from "short".
pub async fn deduct_credits(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
    description: String,
    reference: Option<String>,
) -> Result<User, CoreError> {
    if amount <= 0 {
        return Err(CoreError::validation("deduction amount must be positive"));
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET credits = credits - $1, updated_at = NOW()
        WHERE id = $2 AND credits >= $1
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    match updated {
        Some(user) => {
            CreditTransaction::new(user_id, -amount, CreditTransactionKind::Usage, description, reference)
                .create(&mut **tx)
                .await?;
            Ok(user)
        }
        None => {
            let user = User::find_by_id(&mut **tx, user_id)
                .await?
                .ok_or(CoreError::NotFound("user"))?;
            Err(CoreError::InsufficientCredits {
                required: amount,
                available: user.credits,
            })
        }
    }
}

/// Increments the balance and appends the matching positive ledger entry.
pub async fn grant_credits(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
    kind: CreditTransactionKind,
    description: String,
    reference: Option<String>,
) -> Result<User, CoreError> {
    if amount <= 0 {
        return Err(CoreError::validation("grant amount must be positive"));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET credits = credits + $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(CoreError::NotFound("user"))?;

    CreditTransaction::new(user_id, amount, kind, description, reference)
        .create(&mut **tx)
        .await?;
    Ok(user)
}

/// Idempotent grant keyed on `reference` (checkout session id, subscription
/// id, invoice id). Webhook deliveries can repeat; when an entry with that
/// reference already exists the grant returns `None` and the balance is
/// untouched.
pub async fn grant_credits_once(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
    kind: CreditTransactionKind,
    description: String,
    reference: &str,
) -> Result<Option<User>, CoreError> {
    let already_granted: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM credit_transactions WHERE reference = $1 LIMIT 1")
            .bind(reference)
            .fetch_optional(&mut **tx)
            .await?;
    if already_granted.is_some() {
        tracing::info!(
            "[grant_credits_once] reference {} already granted, skipping",
            reference
        );
        return Ok(None);
    }

    let user = grant_credits(tx, user_id, amount, kind, description, Some(reference.to_string())).await?;
    Ok(Some(user))
}

pub async fn list_transactions<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<CreditTransaction>, CoreError> {
    let entries = sqlx::query_as::<_, CreditTransaction>(
        "SELECT * FROM credit_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(entries)
}
