use anyhow::anyhow;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::json;
use sqlx::types::Uuid;
use stripe::{
    CheckoutSession, CheckoutSessionMode, EventObject, EventType, Invoice, InvoiceBillingReason,
    PaymentIntent, Subscription, Webhook,
};

use taskbay_common::ModuleClient;
use taskbay_core::escrow::{self, ExternalApply, Payment};
use taskbay_core::{subscription, CoreError, PaymentGateway, StripeGateway};

use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn stripe_routes() -> Router<GlobalState> {
    Router::new().route("/stripe/webhook", post(stripe_webhook))
}

/// Entry point for every gateway event. Signature failures reject the
/// request; handler failures are logged and the event is still acknowledged,
/// so Stripe does not retry forever. The reconciliation sweep repairs
/// whatever a dropped event leaves stale.
async fn stripe_webhook(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<AppSuccess, AppError> {
    let sig = headers
        .get("stripe-signature")
        .and_then(|s| s.to_str().ok())
        .ok_or_else(|| {
            AppError::new(StatusCode::BAD_REQUEST, anyhow!("Missing stripe-signature header"))
        })?;

    let event = Webhook::construct_event(
        &String::from_utf8(body.to_vec()).unwrap(),
        sig,
        state.gateway.webhook_secret(),
    )
    .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Webhook error: {}", e)))?;

    let event_label = event.type_.to_string();
    let result = match (event.type_, event.data.object) {
        (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
            handle_checkout_completed(&state, session).await
        }
        (
            EventType::CustomerSubscriptionCreated
            | EventType::CustomerSubscriptionUpdated
            | EventType::CustomerSubscriptionDeleted,
            EventObject::Subscription(sub),
        ) => handle_subscription_event(&state, sub).await,
        (
            EventType::InvoicePaymentSucceeded | EventType::InvoicePaid,
            EventObject::Invoice(invoice),
        ) => handle_invoice_paid(&state, invoice).await,
        (
            EventType::PaymentIntentSucceeded
            | EventType::PaymentIntentProcessing
            | EventType::PaymentIntentPaymentFailed
            | EventType::PaymentIntentCanceled,
            EventObject::PaymentIntent(intent),
        ) => handle_payment_intent_event(&state, intent).await,
        (other, _) => {
            tracing::debug!("[stripe_webhook] ignoring event type {}", other);
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!("[stripe_webhook] {} handling failed: {}", event_label, e);
    }

    Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({})))
}

async fn handle_checkout_completed(
    state: &GlobalState,
    session: CheckoutSession,
) -> Result<(), CoreError> {
    match session.mode {
        CheckoutSessionMode::Subscription => {
            let Some(sub) = session.subscription else {
                tracing::warn!(
                    "[stripe_webhook] subscription checkout {} carries no subscription",
                    session.id
                );
                return Ok(());
            };
            // The subscription events carry the same data, but the checkout
            // event often lands first; syncing here makes the plan visible
            // to the user immediately after they return from Stripe.
            let gw_sub = state.gateway.retrieve_subscription(sub.id().as_str()).await?;
            subscription::sync_subscription(state.db.get_client(), &state.plan_prices, &gw_sub)
                .await?;
        }
        CheckoutSessionMode::Payment => {
            let metadata = session.metadata.clone().unwrap_or_default();
            let (Some(package_id), Some(user_id)) =
                (metadata.get("package_id"), metadata.get("user_id"))
            else {
                tracing::info!(
                    "[stripe_webhook] one-time checkout {} carries no package metadata, ignoring",
                    session.id
                );
                return Ok(());
            };
            let user_id = Uuid::parse_str(user_id).map_err(|_| {
                CoreError::validation(format!("checkout {} has a malformed user id", session.id))
            })?;
            match subscription::apply_credit_purchase(
                state.db.get_client(),
                user_id,
                session.id.as_str(),
                package_id,
            )
            .await?
            {
                Some(user) => tracing::info!(
                    "[stripe_webhook] package {} granted to user {}",
                    package_id,
                    user.id
                ),
                None => tracing::info!(
                    "[stripe_webhook] session {} already granted, skipping",
                    session.id
                ),
            }
        }
        _ => {
            tracing::debug!("[stripe_webhook] checkout {} in unhandled mode", session.id);
        }
    }
    Ok(())
}

async fn handle_subscription_event(
    state: &GlobalState,
    sub: Subscription,
) -> Result<(), CoreError> {
    let view = StripeGateway::subscription_view(sub);
    subscription::sync_subscription(state.db.get_client(), &state.plan_prices, &view).await?;
    Ok(())
}

async fn handle_invoice_paid(state: &GlobalState, invoice: Invoice) -> Result<(), CoreError> {
    if invoice.billing_reason == Some(InvoiceBillingReason::SubscriptionCreate) {
        // The signup invoice's credits are granted by sync_subscription,
        // keyed on the subscription id; granting here would double them.
        tracing::info!(
            "[stripe_webhook] invoice {} is the signup invoice, skipping renewal grant",
            invoice.id
        );
        return Ok(());
    }
    let Some(customer) = invoice.customer.as_ref() else {
        tracing::warn!("[stripe_webhook] invoice {} carries no customer", invoice.id);
        return Ok(());
    };
    let customer_id = customer.id().to_string();
    let granted = subscription::grant_renewal_credits(
        state.db.get_client(),
        &customer_id,
        invoice.id.as_str(),
    )
    .await?;
    if granted.is_none() {
        tracing::info!(
            "[stripe_webhook] no renewal grant for invoice {} (already granted or no plan)",
            invoice.id
        );
    }
    Ok(())
}

async fn handle_payment_intent_event(
    state: &GlobalState,
    intent: PaymentIntent,
) -> Result<(), CoreError> {
    let intent_id = intent.id.as_str();
    let Some(payment) =
        Payment::find_by_intent_id(state.db.get_client().as_ref(), intent_id).await?
    else {
        // Wallet deposit intents have no payment row; those are recorded
        // when the client confirms the deposit.
        tracing::info!("[stripe_webhook] no payment row for intent {}, ignoring", intent_id);
        return Ok(());
    };
    match escrow::apply_external_status(state.db.get_client(), &payment, intent.status.as_str())
        .await?
    {
        ExternalApply::Updated(updated) => {
            tracing::info!(
                "[stripe_webhook] payment {} moved {} -> {}",
                payment.id,
                payment.status,
                updated.status
            );
        }
        ExternalApply::Unchanged | ExternalApply::Ignored => {}
    }
    Ok(())
}
