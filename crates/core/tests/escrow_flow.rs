mod support;

use sqlx::PgPool;
use taskbay_core::booking::{self, Booking, BookingPaymentStatus, BookingStatus};
use taskbay_core::error::CoreError;
use taskbay_core::escrow::{self, ExternalApply, Payment, PaymentStatus};
use taskbay_core::user::{User, UserRole};
use taskbay_core::wallet::{Wallet, WalletTransactionKind};

use support::MockGateway;

struct EscrowFixture {
    customer: User,
    provider: User,
    booking: Booking,
}

/// Provider, service, customer, and one fresh unpaid booking.
async fn open_booking(pool: &PgPool, price_cents: i64) -> EscrowFixture {
    let provider = support::create_user(pool, UserRole::Provider).await;
    let service = support::create_service(pool, &provider, price_cents).await;
    let customer = support::create_customer_with_credits(pool, 10).await;
    let (booking, _) = booking::create_booking(pool, &customer, support::booking_request(&service))
        .await
        .expect("booking");
    EscrowFixture {
        customer,
        provider,
        booking,
    }
}

#[test]
fn a_succeeded_intent_moves_the_payment_to_held() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let fx = open_booking(pool, 6000).await;

        let (payment, secret) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount_cents, 6000);
        assert!(secret.is_some());

        let row = Booking::find_by_id(pool, fx.booking.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.payment_status, BookingPaymentStatus::Processing);
        assert_eq!(row.payment_id, Some(payment.id));

        let applied = escrow::apply_external_status(pool, &payment, "succeeded")
            .await
            .expect("apply");
        let ExternalApply::Updated(held) = applied else {
            panic!("expected an update");
        };
        assert_eq!(held.status, PaymentStatus::Held);

        let row = Booking::find_by_id(pool, fx.booking.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.payment_status, BookingPaymentStatus::Paid);
    })
}

#[test]
fn a_declined_card_retries_against_the_same_intent() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        let intent_id = payment.stripe_payment_intent_id.clone().expect("intent attached");

        // The customer confirmed, then the charge bounced back to
        // requires_payment_method. The booking reopens as unpaid.
        escrow::apply_external_status(pool, &payment, "processing")
            .await
            .expect("processing");
        let processing = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        escrow::apply_external_status(pool, &processing, "requires_payment_method")
            .await
            .expect("bounce");
        let row = Booking::find_by_id(pool, fx.booking.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.payment_status, BookingPaymentStatus::Unpaid);

        let (retry, secret) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("retry");
        assert_eq!(retry.id, payment.id);
        assert_eq!(retry.stripe_payment_intent_id.as_deref(), Some(intent_id.as_str()));
        assert!(secret.is_some());
        assert_eq!(gateway.intents_created(), 1);
    })
}

#[test]
fn a_dead_intent_is_replaced_on_the_same_payment_row() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        let first_intent = payment.stripe_payment_intent_id.clone().expect("intent attached");

        escrow::apply_external_status(pool, &payment, "processing")
            .await
            .expect("processing");
        let processing = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        escrow::apply_external_status(pool, &processing, "requires_payment_method")
            .await
            .expect("bounce");

        // Cancelled at the gateway without the cancellation webhook landing.
        gateway.mark_intent(&first_intent, "canceled");

        let (replaced, secret) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("replace");
        assert_eq!(replaced.id, payment.id);
        assert_ne!(replaced.stripe_payment_intent_id.as_deref(), Some(first_intent.as_str()));
        assert!(secret.is_some());
        assert_eq!(gateway.intents_created(), 2);
    })
}

#[test]
fn release_rejects_anything_but_a_held_payment() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let admin = support::create_user(pool, UserRole::Admin).await;
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        escrow::apply_external_status(pool, &payment, "processing")
            .await
            .expect("processing");

        let err = escrow::release_payment(pool, &admin, payment.id)
            .await
            .expect_err("processing money is not releasable");
        assert!(matches!(err, CoreError::InvalidState(_)));

        // Nothing reached the provider.
        assert!(Wallet::find_by_user(pool, fx.provider.id)
            .await
            .expect("lookup")
            .is_none());
        let row = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.status, PaymentStatus::Processing);
    })
}

#[test]
fn release_credits_the_provider_wallet() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let admin = support::create_user(pool, UserRole::Admin).await;
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        escrow::apply_external_status(pool, &payment, "succeeded")
            .await
            .expect("held");
        booking::update_booking_status(pool, &fx.provider, fx.booking.id, BookingStatus::Confirmed)
            .await
            .expect("confirm");
        booking::update_booking_status(pool, &fx.provider, fx.booking.id, BookingStatus::Completed)
            .await
            .expect("complete");

        let err = escrow::release_payment(pool, &fx.provider, payment.id)
            .await
            .expect_err("only admins release");
        assert!(matches!(err, CoreError::Forbidden(_)));

        let released = escrow::release_payment(pool, &admin, payment.id)
            .await
            .expect("release");
        assert_eq!(released.status, PaymentStatus::Released);
        assert!(released.release_date.is_some());

        let wallet = Wallet::find_by_user(pool, fx.provider.id)
            .await
            .expect("lookup")
            .expect("wallet created by the release");
        assert_eq!(wallet.balance_cents, 6000);
        assert_eq!(support::wallet_tx_sum(pool, wallet.id).await, wallet.balance_cents);

        let earned: Vec<_> = taskbay_core::wallet::WalletTransaction::list_recent(pool, wallet.id, 10)
            .await
            .expect("history")
            .into_iter()
            .filter(|t| t.kind == WalletTransactionKind::ServicePayment)
            .collect();
        assert_eq!(earned.len(), 1);
        assert_eq!(earned[0].amount_cents, 6000);
        assert_eq!(earned[0].booking_id, Some(fx.booking.id));

        // Releasing twice cannot double-pay.
        let err = escrow::release_payment(pool, &admin, payment.id)
            .await
            .expect_err("already released");
        assert!(matches!(err, CoreError::InvalidState(_)));
    })
}

#[test]
fn refund_flips_the_booking_and_records_the_refund_id() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let admin = support::create_user(pool, UserRole::Admin).await;
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        escrow::apply_external_status(pool, &payment, "succeeded")
            .await
            .expect("held");

        let err = escrow::refund_payment(pool, &gateway, &fx.customer, payment.id)
            .await
            .expect_err("only admins refund");
        assert!(matches!(err, CoreError::Forbidden(_)));

        let refunded = escrow::refund_payment(pool, &gateway, &admin, payment.id)
            .await
            .expect("refund");
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert!(refunded.stripe_refund_id.is_some());

        let row = Booking::find_by_id(pool, fx.booking.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.payment_status, BookingPaymentStatus::Refunded);
    })
}

#[test]
fn a_late_gateway_event_cannot_undo_a_settlement() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let admin = support::create_user(pool, UserRole::Admin).await;
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        escrow::apply_external_status(pool, &payment, "succeeded")
            .await
            .expect("held");
        booking::update_booking_status(pool, &fx.provider, fx.booking.id, BookingStatus::Confirmed)
            .await
            .expect("confirm");
        booking::update_booking_status(pool, &fx.provider, fx.booking.id, BookingStatus::Completed)
            .await
            .expect("complete");
        escrow::release_payment(pool, &admin, payment.id)
            .await
            .expect("release");

        let released = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        let applied = escrow::apply_external_status(pool, &released, "succeeded")
            .await
            .expect("apply");
        assert!(matches!(applied, ExternalApply::Ignored));

        let row = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.status, PaymentStatus::Released);
    })
}

#[test]
fn unknown_gateway_statuses_are_ignored() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let fx = open_booking(pool, 6000).await;

        let (payment, _) = escrow::create_payment_intent(pool, &gateway, &fx.customer, fx.booking.id)
            .await
            .expect("open payment");
        let applied = escrow::apply_external_status(pool, &payment, "requires_teleportation")
            .await
            .expect("apply");
        assert!(matches!(applied, ExternalApply::Ignored));

        let row = Payment::find_by_id(pool, payment.id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.status, PaymentStatus::Pending);
    })
}
