use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

mod stripe;

pub use self::stripe::{StripeConfig, StripeGateway};

/// Gateway view of a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount_cents: i64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct GatewayTransfer {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayAccount {
    pub id: String,
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayCheckout {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub price_id: String,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
    pub allow_promotion_codes: bool,
}

/// Outbound calls to the payment processor. Everything the marketplace asks
/// of the processor goes through here, so tests can swap in a scripted
/// double and the webhook path stays the only inbound surface.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<GatewayIntent, CoreError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<GatewayIntent, CoreError>;

    async fn refund_payment(&self, intent_id: &str) -> Result<GatewayRefund, CoreError>;

    async fn create_transfer(
        &self,
        amount_cents: i64,
        destination_account: &str,
    ) -> Result<GatewayTransfer, CoreError>;

    async fn create_customer(&self, email: &str, name: &str) -> Result<String, CoreError>;

    async fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> Result<GatewayCheckout, CoreError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, CoreError>;

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, CoreError>;

    async fn create_connect_account(&self, email: &str) -> Result<String, CoreError>;

    async fn create_account_link(&self, account_id: &str) -> Result<String, CoreError>;

    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, CoreError>;
}
