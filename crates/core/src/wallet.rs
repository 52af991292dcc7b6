use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use strum_macros::{Display, EnumString};

use crate::error::CoreError;
use crate::escrow::DEFAULT_CURRENCY;
use crate::gateway::{GatewayIntent, PaymentGateway};
use crate::subscription;
use crate::user::{User, UserRole};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WalletUserType {
    Customer,
    Provider,
}

impl WalletUserType {
    /// Admins run the marketplace; money never sits in an admin wallet.
    pub fn for_role(role: UserRole) -> Option<WalletUserType> {
        match role {
            UserRole::Customer => Some(WalletUserType::Customer),
            UserRole::Provider => Some(WalletUserType::Provider),
            UserRole::Admin => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WalletTransactionKind {
    Deposit,
    Withdrawal,
    ServicePayment,
    Refund,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WalletTransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: WalletUserType,
    pub balance_cents: i64,
    pub is_active: bool,
    pub stripe_account_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub bank_account_connected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    fn new(user_id: Uuid, user_type: WalletUserType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            user_type,
            balance_cents: 0,
            is_active: true,
            stripe_account_id: None,
            stripe_customer_id: None,
            bank_account_connected: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn find_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<Wallet>, CoreError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
        Ok(wallet)
    }

    /// Lazy creation; a concurrent insert for the same user loses silently
    /// and the existing row wins.
    async fn insert_if_absent<'e, E: PgExecutor<'e>>(
        self,
        executor: E,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, user_id, user_type, balance_cents, is_active, stripe_account_id,
                stripe_customer_id, bank_account_connected, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(self.user_type)
        .bind(self.balance_cents)
        .bind(self.is_active)
        .bind(&self.stripe_account_id)
        .bind(&self.stripe_customer_id)
        .bind(self.bank_account_connected)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub kind: WalletTransactionKind,
    pub status: WalletTransactionStatus,
    pub amount_cents: i64,
    pub description: String,
    pub booking_id: Option<Uuid>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub async fn list_recent<'e, E: PgExecutor<'e>>(
        executor: E,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, CoreError> {
        let entries = sqlx::query_as::<_, WalletTransaction>(
            "SELECT * FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(entries)
    }
}

/// Appends a wallet ledger row. The ledger is append-only; the unique index
/// on `external_reference` makes gateway-referenced entries idempotent, and
/// `None` is returned when the reference was already recorded.
#[allow(clippy::too_many_arguments)]
async fn append_transaction<'e, E: PgExecutor<'e>>(
    executor: E,
    wallet_id: Uuid,
    user_id: Uuid,
    kind: WalletTransactionKind,
    amount_cents: i64,
    description: String,
    booking_id: Option<Uuid>,
    external_reference: Option<String>,
) -> Result<Option<WalletTransaction>, CoreError> {
    let entry = sqlx::query_as::<_, WalletTransaction>(
        r#"
        INSERT INTO wallet_transactions (
            id, wallet_id, user_id, kind, status, amount_cents, description,
            booking_id, external_reference, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        ON CONFLICT (external_reference) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(wallet_id)
    .bind(user_id)
    .bind(kind)
    .bind(WalletTransactionStatus::Completed)
    .bind(amount_cents)
    .bind(&description)
    .bind(booking_id)
    .bind(&external_reference)
    .fetch_optional(executor)
    .await?;
    Ok(entry)
}

async fn adjust_balance(
    tx: &mut Transaction<'_, Postgres>,
    wallet_id: Uuid,
    delta_cents: i64,
) -> Result<Wallet, CoreError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets SET balance_cents = balance_cents + $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(delta_cents)
    .bind(wallet_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(wallet)
}

/// Returns the caller's wallet, creating it on first access. Admins have no
/// wallet.
pub async fn ensure_wallet(pool: &PgPool, user: &User) -> Result<Wallet, CoreError> {
    let user_type = WalletUserType::for_role(user.role)
        .ok_or_else(|| CoreError::validation("admin accounts do not carry a wallet"))?;
    if let Some(wallet) = Wallet::find_by_user(pool, user.id).await? {
        return Ok(wallet);
    }
    Wallet::new(user.id, user_type).insert_if_absent(pool).await?;
    Wallet::find_by_user(pool, user.id)
        .await?
        .ok_or(CoreError::NotFound("wallet"))
}

pub async fn get_wallet_overview(
    pool: &PgPool,
    user: &User,
) -> Result<(Wallet, Vec<WalletTransaction>), CoreError> {
    let wallet = ensure_wallet(pool, user).await?;
    let transactions = WalletTransaction::list_recent(pool, wallet.id, 50).await?;
    Ok((wallet, transactions))
}

/// Opens a gateway intent to fund the caller's wallet and returns it for the
/// frontend to confirm. Nothing is recorded locally until the client comes
/// back through [`confirm_deposit`].
pub async fn start_deposit(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
    amount_cents: i64,
) -> Result<GatewayIntent, CoreError> {
    if user.role != UserRole::Customer {
        return Err(CoreError::Forbidden("wallet deposit"));
    }
    if amount_cents <= 0 {
        return Err(CoreError::validation("deposit amount must be positive"));
    }
    let wallet = ensure_wallet(pool, user).await?;
    if !wallet.is_active {
        return Err(CoreError::invalid_state("wallet is deactivated"));
    }
    if wallet.stripe_customer_id.is_none() {
        let customer_id = subscription::ensure_stripe_customer(pool, gateway, user).await?;
        sqlx::query("UPDATE wallets SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(&customer_id)
            .bind(wallet.id)
            .execute(pool)
            .await?;
    }

    let metadata = std::collections::HashMap::from([
        ("user_id".to_string(), user.id.to_string()),
        ("wallet_id".to_string(), wallet.id.to_string()),
        ("purpose".to_string(), "wallet_deposit".to_string()),
    ]);
    let intent = gateway
        .create_payment_intent(amount_cents, DEFAULT_CURRENCY, metadata)
        .await?;
    tracing::info!(
        "[start_deposit] intent {} opened for wallet {} ({} cents)",
        intent.id,
        wallet.id,
        amount_cents
    );
    Ok(intent)
}

/// Client-invoked deposit settlement. The client's claim is never trusted:
/// the intent is re-read from the gateway, must have succeeded, must carry
/// the caller in its metadata, and must not have been recorded before. The
/// credited amount is the gateway's, not the request's.
pub async fn confirm_deposit(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
    payment_intent_id: &str,
) -> Result<(Wallet, WalletTransaction), CoreError> {
    let wallet = ensure_wallet(pool, user).await?;

    let intent = gateway.retrieve_payment_intent(payment_intent_id).await?;
    if intent.status != "succeeded" {
        return Err(CoreError::invalid_state(format!(
            "deposit payment is {}, must be succeeded",
            intent.status
        )));
    }
    match intent.metadata.get("user_id") {
        Some(owner) if *owner == user.id.to_string() => {}
        _ => return Err(CoreError::Forbidden("wallet deposit")),
    }

    let mut tx = pool.begin().await?;
    let Some(entry) = append_transaction(
        &mut *tx,
        wallet.id,
        user.id,
        WalletTransactionKind::Deposit,
        intent.amount_cents,
        "Wallet deposit".to_string(),
        None,
        Some(intent.id.clone()),
    )
    .await?
    else {
        // Same intent id seen before: replayed confirm, nothing to credit.
        return Err(CoreError::invalid_state(format!(
            "deposit {} has already been recorded",
            intent.id
        )));
    };
    let wallet = adjust_balance(&mut tx, wallet.id, intent.amount_cents).await?;
    tx.commit().await?;

    tracing::info!(
        "[confirm_deposit] wallet {} credited {} cents from intent {}",
        wallet.id,
        intent.amount_cents,
        intent.id
    );
    Ok((wallet, entry))
}

/// Provider payout. The gateway transfer is requested first; the balance
/// decrement and ledger row commit only after the transfer succeeds, so a
/// gateway failure leaves the wallet untouched.
pub async fn withdraw(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
    amount_cents: i64,
) -> Result<(Wallet, WalletTransaction), CoreError> {
    if user.role != UserRole::Provider {
        return Err(CoreError::Forbidden("wallet withdrawal"));
    }
    let wallet = ensure_wallet(pool, user).await?;
    if !wallet.is_active {
        return Err(CoreError::invalid_state("wallet is deactivated"));
    }
    let account_id = wallet
        .stripe_account_id
        .as_deref()
        .ok_or_else(|| CoreError::invalid_state("no payout account connected"))?;
    if !wallet.bank_account_connected {
        return Err(CoreError::invalid_state("bank account not connected"));
    }
    if amount_cents <= 0 {
        return Err(CoreError::validation("withdrawal amount must be positive"));
    }
    if amount_cents > wallet.balance_cents {
        return Err(CoreError::InsufficientFunds {
            requested: amount_cents,
            available: wallet.balance_cents,
        });
    }

    let transfer = gateway.create_transfer(amount_cents, account_id).await?;

    let mut tx = pool.begin().await?;
    let entry = append_transaction(
        &mut *tx,
        wallet.id,
        user.id,
        WalletTransactionKind::Withdrawal,
        -amount_cents,
        "Withdrawal to bank account".to_string(),
        None,
        Some(transfer.id.clone()),
    )
    .await?
    .ok_or_else(|| CoreError::invalid_state(format!("transfer {} already recorded", transfer.id)))?;
    let wallet = adjust_balance(&mut tx, wallet.id, -amount_cents).await?;
    tx.commit().await?;

    if wallet.balance_cents < 0 {
        // Transfer money left before a concurrent spend was visible.
        tracing::error!(
            "[withdraw] wallet {} went negative ({} cents) after transfer {}",
            wallet.id,
            wallet.balance_cents,
            transfer.id
        );
    }
    tracing::info!(
        "[withdraw] wallet {} paid out {} cents (transfer {})",
        wallet.id,
        amount_cents,
        transfer.id
    );
    Ok((wallet, entry))
}

/// Credits a provider for a released booking payment. Runs inside the
/// release transaction so the payment flip and the wallet credit commit
/// together.
pub async fn credit_service_payment(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: Uuid,
    amount_cents: i64,
    booking_id: Uuid,
    description: String,
) -> Result<Wallet, CoreError> {
    Wallet::new(provider_id, WalletUserType::Provider)
        .insert_if_absent(&mut **tx)
        .await?;
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets SET balance_cents = balance_cents + $1, updated_at = NOW() WHERE user_id = $2 RETURNING *",
    )
    .bind(amount_cents)
    .bind(provider_id)
    .fetch_one(&mut **tx)
    .await?;
    append_transaction(
        &mut **tx,
        wallet.id,
        provider_id,
        WalletTransactionKind::ServicePayment,
        amount_cents,
        description,
        Some(booking_id),
        None,
    )
    .await?;
    Ok(wallet)
}

///// Provider onboarding for payouts: create-or-reuse the connected account
/// and hand back the hosted onboarding link.
pub async fn connect_bank_account(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
) -> Result<String, CoreError> {
    if user.role != UserRole::Provider {
        return Err(CoreError::Forbidden("payout account"));
    }
    let wallet = ensure_wallet(pool, user).await?;

    let account_id = match wallet.stripe_account_id {
        Some(id) => id,
        None => {
            let id = gateway.create_connect_account(&user.email).await?;
            sqlx::query("UPDATE wallets SET stripe_account_id = $1, updated_at = NOW() WHERE id = $2")
                .bind(&id)
                .bind(wallet.id)
                .execute(pool)
                .await?;
            tracing::info!(
                "[connect_bank_account] account {} created for wallet {}",
                id,
                wallet.id
            );
            id
        }
    };
    gateway.create_account_link(&account_id).await
}

/// Re-reads the connected account and persists whether payouts are enabled.
pub async fn refresh_connect_status(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user: &User,
) -> Result<Wallet, CoreError> {
    let wallet = ensure_wallet(pool, user).await?;
    let account_id = wallet
        .stripe_account_id
        .as_deref()
        .ok_or_else(|| CoreError::invalid_state("no payout account connected"))?;

    let account = gateway.retrieve_account(account_id).await?;
    if account.payouts_enabled == wallet.bank_account_connected {
        return Ok(wallet);
    }
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets SET bank_account_connected = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(account.payouts_enabled)
    .bind(wallet.id)
    .fetch_one(pool)
    .await?;
    tracing::info!(
        "[refresh_connect_status] wallet {} bank_account_connected = {}",
        wallet.id,
        wallet.bank_account_connected
    );
    Ok(wallet)
}
