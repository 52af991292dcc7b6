use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{PgExecutor, PgPool};
use strum_macros::{Display, EnumString};

use crate::booking::{Booking, BookingPaymentStatus, BookingStatus};
use crate::error::CoreError;
use crate::gateway::PaymentGateway;
use crate::refs::HasId;
use crate::user::{User, UserRole};
use crate::wallet;

pub const DEFAULT_CURRENCY: &str = "usd";

/// Escrow lifecycle of a booking payment. `pending` through `held` mirror the
/// gateway's view of the intent; `released` and `refunded` are settlement
/// states this side owns and the gateway never reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Held,
    Released,
    Refunded,
    Failed,
}

impl PaymentStatus {
    /// Settled payments are never rewritten, not even by the gateway.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Released | PaymentStatus::Refunded)
    }

    /// Legal moves for operator-initiated transitions (release, refund).
    /// Gateway-driven updates go through [`apply_external_status`] instead,
    /// which treats the gateway as authoritative.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Held)
                | (Pending, Failed)
                | (Processing, Held)
                | (Processing, Refunded)
                | (Processing, Failed)
                | (Held, Released)
                | (Held, Refunded)
        )
    }
}

/// Fixed mapping from gateway intent status to our escrow status. Unknown
/// statuses map to `None` and are left untouched.
pub fn map_external_status(external: &str) -> Option<PaymentStatus> {
    match external {
        "succeeded" => Some(PaymentStatus::Held),
        "processing" => Some(PaymentStatus::Processing),
        "requires_payment_method" | "requires_confirmation" | "requires_action"
        | "requires_capture" => Some(PaymentStatus::Pending),
        "canceled" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// The booking-side reflection of each payment status.
pub fn booking_payment_status_for(status: PaymentStatus) -> BookingPaymentStatus {
    match status {
        PaymentStatus::Pending => BookingPaymentStatus::Unpaid,
        PaymentStatus::Processing => BookingPaymentStatus::Processing,
        PaymentStatus::Held | PaymentStatus::Released => BookingPaymentStatus::Paid,
        PaymentStatus::Refunded => BookingPaymentStatus::Refunded,
        PaymentStatus::Failed => BookingPaymentStatus::Failed,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_refund_id: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for Payment {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

impl Payment {
    fn for_booking(booking: &Booking, intent_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            customer_id: booking.customer_id,
            provider_id: booking.provider_id,
            amount_cents: booking.price_cents,
            currency: DEFAULT_CURRENCY.to_string(),
            status: PaymentStatus::Pending,
            stripe_payment_intent_id: Some(intent_id),
            stripe_refund_id: None,
            release_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Payment>, CoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(payment)
    }

    pub async fn find_by_booking<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, CoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(executor)
            .await?;
        Ok(payment)
    }

    pub async fn find_by_intent_id<'e, E: PgExecutor<'e>>(
        executor: E,
        intent_id: &str,
    ) -> Result<Option<Payment>, CoreError> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE stripe_payment_intent_id = $1")
                .bind(intent_id)
                .fetch_optional(executor)
                .await?;
        Ok(payment)
    }

    /// Payments sitting in `processing` since before the cutoff. These are
    /// the candidates the reconciliation sweep re-checks against the gateway.
    pub async fn list_stale_processing<'e, E: PgExecutor<'e>>(
        executor: E,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Payment>, CoreError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE status = $1 AND updated_at < $2 ORDER BY updated_at ASC",
        )
        .bind(PaymentStatus::Processing)
        .bind(cutoff)
        .fetch_all(executor)
        .await?;
        Ok(payments)
    }

    async fn insert<'e, E: PgExecutor<'e>>(self, executor: E) -> Result<Payment, CoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, booking_id, customer_id, provider_id, amount_cents, currency,
                status, stripe_payment_intent_id, stripe_refund_id, release_date,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.booking_id)
        .bind(self.customer_id)
        .bind(self.provider_id)
        .bind(self.amount_cents)
        .bind(&self.currency)
        .bind(self.status)
        .bind(&self.stripe_payment_intent_id)
        .bind(&self.stripe_refund_id)
        .bind(self.release_date)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(payment)
    }
}

/// Links a payment row to its booking and flags the booking as mid-payment.
async fn attach_to_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: Uuid,
    booking_id: Uuid,
) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE bookings SET payment_id = $1, payment_status = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(payment_id)
    .bind(BookingPaymentStatus::Processing)
    .bind(booking_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Starts (or resumes) the payment flow for a booking. The booking must be
/// unpaid; while a previous intent is still confirmable the same intent is
/// handed back, so a declined card retries against one gateway object rather
/// than piling up intents. A dead intent gets replaced in place, keeping the
/// one-payment-per-booking row. Returns the payment and the client secret the
/// frontend confirms with.
pub async fn create_payment_intent(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    customer: &User,
    booking_id: Uuid,
) -> Result<(Payment, Option<String>), CoreError> {
    let booking = Booking::find_by_id(pool, booking_id)
        .await?
        .ok_or(CoreError::NotFound("booking"))?;
    if booking.customer_id != customer.id {
        return Err(CoreError::Forbidden("booking"));
    }
    if booking.status.is_terminal() {
        return Err(CoreError::invalid_state(format!(
            "booking is {}, no payment can be taken",
            booking.status
        )));
    }
    if booking.payment_status != BookingPaymentStatus::Unpaid {
        return Err(CoreError::invalid_state(format!(
            "booking payment is already {}",
            booking.payment_status
        )));
    }

    let existing = Payment::find_by_booking(pool, booking.id).await?;

    if let Some(payment) = &existing {
        if payment.status == PaymentStatus::Pending {
            if let Some(intent_id) = payment.stripe_payment_intent_id.as_deref() {
                match gateway.retrieve_payment_intent(intent_id).await {
                    Ok(intent) if map_external_status(&intent.status) == Some(PaymentStatus::Pending) => {
                        let mut tx = pool.begin().await?;
                        attach_to_booking(&mut tx, payment.id, booking.id).await?;
                        tx.commit().await?;
                        tracing::info!(
                            "[create_payment_intent] reusing intent {} for booking {}",
                            intent_id,
                            booking.id
                        );
                        return Ok((payment.clone(), intent.client_secret));
                    }
                    Ok(intent) => {
                        tracing::warn!(
                            "[create_payment_intent] intent {} is {}, replacing it for booking {}",
                            intent_id,
                            intent.status,
                            booking.id
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[create_payment_intent] could not re-check intent {}: {}, replacing it",
                            intent_id,
                            e
                        );
                    }
                }
            }
        }
    }

    let metadata = std::collections::HashMap::from([
        ("booking_id".to_string(), booking.id.to_string()),
        ("customer_id".to_string(), customer.id.to_string()),
    ]);
    let intent = gateway
        .create_payment_intent(booking.price_cents, DEFAULT_CURRENCY, metadata)
        .await?;
    let client_secret = intent.client_secret.clone();

    let mut tx = pool.begin().await?;
    let payment = match existing {
        Some(stale) => {
            sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments
                SET stripe_payment_intent_id = $1, status = $2, updated_at = NOW()
                WHERE id = $3
                RETURNING *
                "#,
            )
            .bind(&intent.id)
            .bind(PaymentStatus::Pending)
            .bind(stale.id)
            .fetch_one(&mut *tx)
            .await?
        }
        None => Payment::for_booking(&booking, intent.id).insert(&mut *tx).await?,
    };
    attach_to_booking(&mut tx, payment.id, booking.id).await?;
    tx.commit().await?;

    tracing::info!(
        "[create_payment_intent] payment {} opened for booking {} ({} cents)",
        payment.id,
        booking.id,
        payment.amount_cents
    );
    Ok((payment, client_secret))
}

/// Writes a payment status and its booking reflection in one transaction.
/// Shared by the webhook path and the reconciliation sweep.
pub async fn persist_status_change(
    pool: &PgPool,
    payment: &Payment,
    new_status: PaymentStatus,
) -> Result<Payment, CoreError> {
    let mut tx = pool.begin().await?;
    let updated = sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(new_status)
    .bind(payment.id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE bookings SET payment_status = $1, updated_at = NOW() WHERE id = $2")
        .bind(booking_payment_status_for(new_status))
        .bind(payment.booking_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        "[persist_status_change] payment {} moved {} -> {}",
        payment.id,
        payment.status,
        new_status
    );
    Ok(updated)
}

#[derive(Debug)]
pub enum ExternalApply {
    Updated(Payment),
    Unchanged,
    Ignored,
}

/// Applies a gateway-reported intent status to a payment. The gateway is
/// authoritative for everything up to `held`; settled payments and backward
/// moves out of `held` are ignored so a late-delivered event cannot undo a
/// settlement.
pub async fn apply_external_status(
    pool: &PgPool,
    payment: &Payment,
    external: &str,
) -> Result<ExternalApply, CoreError> {
    let Some(mapped) = map_external_status(external) else {
        tracing::warn!(
            "[apply_external_status] unrecognized gateway status {} for payment {}",
            external,
            payment.id
        );
        return Ok(ExternalApply::Ignored);
    };
    if payment.status.is_settled() {
        tracing::warn!(
            "[apply_external_status] payment {} already {}, ignoring gateway status {}",
            payment.id,
            payment.status,
            external
        );
        return Ok(ExternalApply::Ignored);
    }
    if mapped == payment.status {
        return Ok(ExternalApply::Unchanged);
    }
    if payment.status == PaymentStatus::Held
        && matches!(mapped, PaymentStatus::Pending | PaymentStatus::Processing)
    {
        tracing::warn!(
            "[apply_external_status] stale gateway status {} for held payment {}",
            external,
            payment.id
        );
        return Ok(ExternalApply::Ignored);
    }

    let updated = persist_status_change(pool, payment, mapped).await?;
    Ok(ExternalApply::Updated(updated))
}

/// Admin releases held funds to the provider. The booking must be completed
/// and paid and the payment held; on success the payment moves to `released`
/// with a release date and the provider's wallet is credited, atomically.
pub async fn release_payment(
    pool: &PgPool,
    actor: &User,
    payment_id: Uuid,
) -> Result<Payment, CoreError> {
    if actor.role != UserRole::Admin {
        return Err(CoreError::Forbidden("payment"));
    }
    let payment = Payment::find_by_id(pool, payment_id)
        .await?
        .ok_or(CoreError::NotFound("payment"))?;
    let booking = Booking::find_by_id(pool, payment.booking_id)
        .await?
        .ok_or(CoreError::NotFound("booking"))?;
    if booking.status != BookingStatus::Completed {
        return Err(CoreError::invalid_state(format!(
            "booking is {}, must be completed before funds release",
            booking.status
        )));
    }
    if booking.payment_status != BookingPaymentStatus::Paid {
        return Err(CoreError::invalid_state(format!(
            "booking payment is {}, must be paid before funds release",
            booking.payment_status
        )));
    }
    if payment.status != PaymentStatus::Held {
        return Err(CoreError::invalid_state(format!(
            "payment is {}, must be held before funds release",
            payment.status
        )));
    }

    let mut tx = pool.begin().await?;
    let updated = sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = $1, release_date = NOW(), updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(PaymentStatus::Released)
    .bind(payment.id)
    .fetch_one(&mut *tx)
    .await?;
    wallet::credit_service_payment(
        &mut tx,
        payment.provider_id,
        payment.amount_cents,
        payment.booking_id,
        format!("Service payment for booking {}", payment.booking_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "[release_payment] payment {} released to provider {} ({} cents)",
        payment.id,
        payment.provider_id,
        payment.amount_cents
    );
    Ok(updated)
}

/// Admin refunds a payment through the gateway, then records the refund and
/// flips the booking to `refunded`. The gateway call comes first; if it
/// fails nothing is persisted and the operation can be retried.
pub async fn refund_payment(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    actor: &User,
    payment_id: Uuid,
) -> Result<Payment, CoreError> {
    if actor.role != UserRole::Admin {
        return Err(CoreError::Forbidden("payment"));
    }
    let payment = Payment::find_by_id(pool, payment_id)
        .await?
        .ok_or(CoreError::NotFound("payment"))?;
    if !payment.status.can_transition_to(PaymentStatus::Refunded) {
        return Err(CoreError::invalid_state(format!(
            "payment cannot move from {} to refunded",
            payment.status
        )));
    }
    let intent_id = payment
        .stripe_payment_intent_id
        .as_deref()
        .ok_or_else(|| CoreError::invalid_state("payment has no gateway intent"))?;

    let refund = gateway.refund_payment(intent_id).await?;

    let mut tx = pool.begin().await?;
    let updated = sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = $1, stripe_refund_id = $2, updated_at = NOW() WHERE id = $3 RETURNING *",
    )
    .bind(PaymentStatus::Refunded)
    .bind(&refund.id)
    .bind(payment.id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE bookings SET payment_status = $1, updated_at = NOW() WHERE id = $2")
        .bind(BookingPaymentStatus::Refunded)
        .bind(payment.booking_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        "[refund_payment] payment {} refunded (refund {})",
        payment.id,
        refund.id
    );
    Ok(updated)
}

pub async fn get_payment(
    pool: &PgPool,
    actor: &User,
    payment_id: Uuid,
) -> Result<Payment, CoreError> {
    let payment = Payment::find_by_id(pool, payment_id)
        .await?
        .ok_or(CoreError::NotFound("payment"))?;
    if actor.role != UserRole::Admin
        && payment.customer_id != actor.id
        && payment.provider_id != actor.id
    {
        return Err(CoreError::Forbidden("payment"));
    }
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_status_mapping_is_fixed() {
        assert_eq!(map_external_status("succeeded"), Some(PaymentStatus::Held));
        assert_eq!(map_external_status("processing"), Some(PaymentStatus::Processing));
        for requires in [
            "requires_payment_method",
            "requires_confirmation",
            "requires_action",
            "requires_capture",
        ] {
            assert_eq!(map_external_status(requires), Some(PaymentStatus::Pending));
        }
        assert_eq!(map_external_status("canceled"), Some(PaymentStatus::Failed));
        assert_eq!(map_external_status("something_new"), None);
    }

    #[test]
    fn booking_reflection_of_each_status() {
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Pending),
            BookingPaymentStatus::Unpaid
        );
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Processing),
            BookingPaymentStatus::Processing
        );
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Held),
            BookingPaymentStatus::Paid
        );
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Released),
            BookingPaymentStatus::Paid
        );
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Refunded),
            BookingPaymentStatus::Refunded
        );
        assert_eq!(
            booking_payment_status_for(PaymentStatus::Failed),
            BookingPaymentStatus::Failed
        );
    }

    #[test]
    fn release_only_from_held() {
        use PaymentStatus::*;
        assert!(Held.can_transition_to(Released));
        for status in [Pending, Processing, Released, Refunded, Failed] {
            assert!(!status.can_transition_to(Released));
        }
    }

    #[test]
    fn refund_only_from_processing_or_held() {
        use PaymentStatus::*;
        assert!(Processing.can_transition_to(Refunded));
        assert!(Held.can_transition_to(Refunded));
        for status in [Pending, Released, Refunded, Failed] {
            assert!(!status.can_transition_to(Refunded));
        }
    }

    #[test]
    fn settled_statuses() {
        assert!(PaymentStatus::Released.is_settled());
        assert!(PaymentStatus::Refunded.is_settled());
        assert!(!PaymentStatus::Held.is_settled());
        assert!(!PaymentStatus::Failed.is_settled());
    }
}
