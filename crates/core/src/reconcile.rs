use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use sqlx::types::Uuid;
use sqlx::PgPool;

use crate::error::CoreError;
use crate::escrow::{self, ExternalApply, Payment, PaymentStatus};
use crate::gateway::{GatewayIntent, PaymentGateway};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// How long a payment may sit in `processing` before the sweep re-checks
    /// it against the gateway.
    pub stale_after: Duration,
    pub lookup_timeout: Duration,
    pub lookup_concurrency: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }
}

/// What the sweep did to one payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub payment_id: Uuid,
    pub stripe_payment_intent_id: Option<String>,
    pub previous_status: PaymentStatus,
    pub external_status: Option<String>,
    pub new_status: Option<PaymentStatus>,
    pub success: bool,
    pub error: Option<String>,
}

impl ReconcileOutcome {
    fn repaired(payment: &Payment, external: &str, new_status: PaymentStatus) -> Self {
        Self {
            payment_id: payment.id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
            previous_status: payment.status,
            external_status: Some(external.to_string()),
            new_status: Some(new_status),
            success: true,
            error: None,
        }
    }

    fn unchanged(payment: &Payment, external: &str) -> Self {
        Self {
            payment_id: payment.id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
            previous_status: payment.status,
            external_status: Some(external.to_string()),
            new_status: None,
            success: true,
            error: None,
        }
    }

    fn failure(payment: &Payment, external: Option<&str>, error: String) -> Self {
        Self {
            payment_id: payment.id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
            previous_status: payment.status,
            external_status: external.map(str::to_string),
            new_status: None,
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned: usize,
    pub repaired: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        if !outcome.success {
            self.failed += 1;
        } else if outcome.new_status.is_some() {
            self.repaired += 1;
        } else {
            self.unchanged += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// One sweep over payments stuck in `processing` past the staleness cutoff.
///
/// Phase one queries the gateway for each stale intent with bounded
/// concurrency, every lookup under its own timeout. Phase two applies the
/// results sequentially through the same status-change path the webhook
/// uses. A failure on one payment is recorded in its outcome and the sweep
/// moves on.
pub async fn run_reconciliation(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &ReconcileConfig,
) -> Result<ReconcileReport, CoreError> {
    let cutoff = Utc::now() - chrono::Duration::seconds(config.stale_after.as_secs() as i64);
    let stale = Payment::list_stale_processing(pool, cutoff).await?;
    if stale.is_empty() {
        tracing::debug!("[run_reconciliation] no stale payments");
        return Ok(ReconcileReport::default());
    }
    tracing::info!("[run_reconciliation] checking {} stale payments", stale.len());

    let lookup_timeout = config.lookup_timeout;
    let lookups: Vec<(Payment, Result<GatewayIntent, CoreError>)> =
        futures::stream::iter(stale.into_iter().map(|payment| async move {
            let Some(intent_id) = payment.stripe_payment_intent_id.clone() else {
                return (
                    payment,
                    Err(CoreError::invalid_state("payment has no gateway intent")),
                );
            };
            let result =
                match tokio::time::timeout(lookup_timeout, gateway.retrieve_payment_intent(&intent_id))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::gateway(format!(
                        "intent lookup timed out after {lookup_timeout:?}"
                    ))),
                };
            (payment, result)
        }))
        .buffer_unordered(config.lookup_concurrency.max(1))
        .collect()
        .await;

    let mut report = ReconcileReport {
        scanned: lookups.len(),
        ..Default::default()
    };
    for (payment, lookup) in lookups {
        let outcome = match lookup {
            Ok(intent) => apply_lookup(pool, &payment, &intent).await,
            Err(e) => {
                tracing::warn!(
                    "[run_reconciliation] lookup failed for payment {}: {}",
                    payment.id,
                    e
                );
                ReconcileOutcome::failure(&payment, None, e.to_string())
            }
        };
        report.record(outcome);
    }

    tracing::info!(
        "[run_reconciliation] scanned {} repaired {} unchanged {} failed {}",
        report.scanned,
        report.repaired,
        report.unchanged,
        report.failed
    );
    Ok(report)
}

async fn apply_lookup(pool: &PgPool, payment: &Payment, intent: &GatewayIntent) -> ReconcileOutcome {
    match escrow::apply_external_status(pool, payment, &intent.status).await {
        Ok(ExternalApply::Updated(updated)) => {
            ReconcileOutcome::repaired(payment, &intent.status, updated.status)
        }
        Ok(ExternalApply::Unchanged | ExternalApply::Ignored) => {
            ReconcileOutcome::unchanged(payment, &intent.status)
        }
        Err(e) => {
            tracing::warn!(
                "[run_reconciliation] persist failed for payment {}: {}",
                payment.id,
                e
            );
            ReconcileOutcome::failure(payment, Some(&intent.status), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payment(status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            amount_cents: 5000,
            currency: "usd".to_string(),
            status,
            stripe_payment_intent_id: Some("pi_test".to_string()),
            stripe_refund_id: None,
            release_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn report_tallies_outcomes() {
        let mut report = ReconcileReport::default();
        let p = payment(PaymentStatus::Processing);

        report.record(ReconcileOutcome::repaired(&p, "succeeded", PaymentStatus::Held));
        report.record(ReconcileOutcome::unchanged(&p, "processing"));
        report.record(ReconcileOutcome::failure(&p, None, "timeout".to_string()));

        assert_eq!(report.repaired, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 3);
    }

    #[test]
    fn outcome_keeps_previous_status() {
        let p = payment(PaymentStatus::Processing);
        let outcome = ReconcileOutcome::repaired(&p, "succeeded", PaymentStatus::Held);
        assert_eq!(outcome.previous_status, PaymentStatus::Processing);
        assert_eq!(outcome.new_status, Some(PaymentStatus::Held));
        assert!(outcome.success);
    }

    #[test]
    fn defaults_match_the_sweep_contract() {
        let config = ReconcileConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(12 * 60 * 60));
        assert_eq!(DEFAULT_SWEEP_INTERVAL, Duration::from_secs(4 * 60 * 60));
    }
}
