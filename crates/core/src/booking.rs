use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{PgExecutor, PgPool, Postgres};
use strum_macros::{Display, EnumString};

use crate::credits::{self, BOOKING_CREDIT_COST};
use crate::error::CoreError;
use crate::refs::{HasId, Ref};
use crate::service::Service;
use crate::user::{User, UserRole};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The booking state machine: pending → confirmed → completed, with
    /// cancellation possible until the work is done. No transition leaves a
    /// terminal state, and no step may be skipped.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingPaymentStatus {
    Unpaid,
    Processing,
    Paid,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub service_option: String,
    pub price_cents: i64,
    pub date: NaiveDate,
    pub time_slot: String,
    pub address: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for Booking {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// Booking as returned to clients: the service and the two parties are
/// [`Ref`]s, bare ids in listings and resolved records in the detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Uuid,
    pub service: Ref<Service>,
    pub customer: Ref<User>,
    pub provider: Ref<User>,
    pub service_option: String,
    pub price_cents: i64,
    pub date: NaiveDate,
    pub time_slot: String,
    pub address: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub service_id: Uuid,
    pub service_option: String,
    pub date: NaiveDate,
    pub time_slot: String,
    pub address: String,
    pub notes: Option<String>,
}

impl Booking {
    fn from_request(req: &CreateBooking, service: &Service, customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_id: service.id,
            customer_id,
            provider_id: service.provider_id,
            service_option: req.service_option.clone(),
            price_cents: service.price_cents,
            date: req.date,
            time_slot: req.time_slot.clone(),
            address: req.address.clone(),
            notes: req.notes.clone(),
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Unpaid,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_view(self) -> BookingView {
        BookingView {
            id: self.id,
            service: Ref::Id(self.service_id),
            customer: Ref::Id(self.customer_id),
            provider: Ref::Id(self.provider_id),
            service_option: self.service_option,
            price_cents: self.price_cents,
            date: self.date,
            time_slot: self.time_slot,
            address: self.address,
            notes: self.notes,
            status: self.status,
            payment_status: self.payment_status,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn into_resolved_view(self, service: Service, customer: User, provider: User) -> BookingView {
        let mut view = self.into_view();
        view.service = Ref::resolved(service);
        view.customer = Ref::resolved(customer);
        view.provider = Ref::resolved(provider);
        view
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Booking>, CoreError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(booking)
    }

    async fn insert<'e, E: PgExecutor<'e>>(self, executor: E) -> Result<Booking, CoreError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                id, service_id, customer_id, provider_id, service_option, price_cents,
                date, time_slot, address, notes, status, payment_status, payment_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.service_id)
        .bind(self.customer_id)
        .bind(self.provider_id)
        .bind(&self.service_option)
        .bind(self.price_cents)
        .bind(self.date)
        .bind(&self.time_slot)
        .bind(&self.address)
        .bind(&self.notes)
        .bind(self.status)
        .bind(self.payment_status)
        .bind(self.payment_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(booking)
    }
}

/// Creates a booking for a customer and deducts the fixed credit cost, both
/// inside one transaction so a shortfall leaves no half-created booking
/// behind.
pub async fn create_booking(
    pool: &PgPool,
    customer: &User,
    req: CreateBooking,
) -> Result<(Booking, User), CoreError> {
    if customer.role != UserRole::Customer {
        return Err(CoreError::Forbidden("booking"));
    }

    let service = Service::find_by_id(pool, req.service_id)
        .await?
        .ok_or(CoreError::NotFound("service"))?;
    if !service.is_active {
        return Err(CoreError::NotFound("service"));
    }

    let mut tx = pool.begin().await?;
    let booking = Booking::from_request(&req, &service, customer.id)
        .insert(&mut *tx)
        .await?;
    let updated_customer = credits::deduct_credits(
        &mut tx,
        customer.id,
        BOOKING_CREDIT_COST,
        format!("Booking for {}", service.title),
        Some(booking.id.to_string()),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "[create_booking] booking {} created for service {} by {}",
        booking.id,
        service.id,
        customer.id
    );
    Ok((booking, updated_customer))
}

/// Role-gated status transition. Customers may only cancel their own
/// bookings; providers may confirm, complete, or cancel bookings assigned to
/// them; admins are unrestricted. Completion additionally requires the
/// payment to have settled.
pub async fn update_booking_status(
    pool: &PgPool,
    actor: &User,
    booking_id: Uuid,
    requested: BookingStatus,
) -> Result<Booking, CoreError> {
    let booking = Booking::find_by_id(pool, booking_id)
        .await?
        .ok_or(CoreError::NotFound("booking"))?;

    match actor.role {
        UserRole::Admin => {}
        UserRole::Customer => {
            if booking.customer_id != actor.id {
                return Err(CoreError::Forbidden("booking"));
            }
            if requested != BookingStatus::Cancelled {
                return Err(CoreError::Forbidden("booking"));
            }
        }
        UserRole::Provider => {
            if booking.provider_id != actor.id {
                return Err(CoreError::Forbidden("booking"));
            }
        }
    }

    if !booking.status.can_transition_to(requested) {
        return Err(CoreError::invalid_state(format!(
            "booking cannot move from {} to {}",
            booking.status, requested
        )));
    }
    if requested == BookingStatus::Completed && booking.payment_status != BookingPaymentStatus::Paid
    {
        return Err(CoreError::invalid_state(format!(
            "booking payment status is {}, must be paid before completion",
            booking.payment_status
        )));
    }

    let updated = sqlx::query_as::<_, Booking>(
        "UPDATE bookings SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(requested)
    .bind(booking_id)
    .fetch_one(pool)
    .await?;
    Ok(updated)
}

/// Detail view with the service and both parties resolved. Only the parties
/// to the booking (and admins) may read it.
pub async fn get_booking(
    pool: &PgPool,
    actor: &User,
    booking_id: Uuid,
) -> Result<BookingView, CoreError> {
    let booking = Booking::find_by_id(pool, booking_id)
        .await?
        .ok_or(CoreError::NotFound("booking"))?;
    if actor.role != UserRole::Admin
        && booking.customer_id != actor.id
        && booking.provider_id != actor.id
    {
        return Err(CoreError::Forbidden("booking"));
    }

    let service = Service::find_by_id(pool, booking.service_id)
        .await?
        .ok_or(CoreError::NotFound("service"))?;
    let customer = User::find_by_id(pool, booking.customer_id)
        .await?
        .ok_or(CoreError::NotFound("user"))?;
    let provider = User::find_by_id(pool, booking.provider_id)
        .await?
        .ok_or(CoreError::NotFound("user"))?;

    Ok(booking.into_resolved_view(service, customer, provider))
}

/// Caller-scoped listing: customers see their own bookings, providers the
/// ones assigned to them, admins everything. Refs stay unresolved.
pub async fn list_bookings(
    pool: &PgPool,
    actor: &User,
    status: Option<BookingStatus>,
) -> Result<Vec<BookingView>, CoreError> {
    let mut qb = sqlx::QueryBuilder::<Postgres>::new("SELECT * FROM bookings WHERE ");
    match actor.role {
        UserRole::Customer => {
            qb.push("customer_id = ").push_bind(actor.id);
        }
        UserRole::Provider => {
            qb.push("provider_id = ").push_bind(actor.id);
        }
        UserRole::Admin => {
            qb.push("TRUE");
        }
    }
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status);
    }
    qb.push(" ORDER BY created_at DESC");

    let bookings = qb.build_query_as::<Booking>().fetch_all(pool).await?;
    Ok(bookings.into_iter().map(Booking::into_view).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shortcut_from_pending_to_completed() {
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Completed));
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        use BookingStatus::*;
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn cancellation_is_open_until_completion() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Cancelled));
    }

    #[test]
    fn same_status_is_not_a_legal_transition() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn status_text_forms() {
        use std::str::FromStr;
        assert_eq!(BookingStatus::Pending.to_string(), "pending");
        assert_eq!(BookingPaymentStatus::Unpaid.to_string(), "unpaid");
        assert_eq!(BookingStatus::from_str("cancelled").unwrap(), BookingStatus::Cancelled);
    }
}
