use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, CheckoutSession,
    CheckoutSessionMode, Client, CreateAccount, CreateAccountCapabilities,
    CreateAccountCapabilitiesTransfers, CreateAccountLink, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCustomer, CreatePaymentIntent, CreateRefund,
    CreateTransfer, Currency, Customer, CustomerId, PaymentIntent, PaymentIntentId, Refund,
    Subscription, SubscriptionId, Transfer, UpdateSubscription,
};

use super::{
    CheckoutMode, CheckoutParams, GatewayAccount, GatewayCheckout, GatewayIntent, GatewayRefund,
    GatewaySubscription, GatewayTransfer, PaymentGateway,
};
use crate::error::CoreError;

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub connect_refresh_url: String,
    pub connect_return_url: String,
}

pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(config.secret_key.clone());
        Self { client, config }
    }

    pub fn webhook_secret(&self) -> &str {
        &self.config.webhook_secret
    }

    fn intent_view(intent: PaymentIntent) -> GatewayIntent {
        GatewayIntent {
            id: intent.id.to_string(),
            client_secret: intent.client_secret,
            status: intent.status.as_str().to_string(),
            amount_cents: intent.amount,
            metadata: intent.metadata,
        }
    }

    /// Flattens the gateway object into the fields the marketplace tracks.
    /// The webhook path reuses this for subscription objects arriving in
    /// events.
    pub fn subscription_view(sub: Subscription) -> GatewaySubscription {
        let price_id = sub
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string());
        GatewaySubscription {
            id: sub.id.to_string(),
            customer_id: sub.customer.id().to_string(),
            status: sub.status.as_str().to_string(),
            price_id,
            current_period_start: DateTime::from_timestamp(sub.current_period_start, 0),
            current_period_end: DateTime::from_timestamp(sub.current_period_end, 0),
            trial_start: sub.trial_start.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            trial_end: sub.trial_end.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            cancel_at_period_end: sub.cancel_at_period_end,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<GatewayIntent, CoreError> {
        let currency = currency
            .parse::<Currency>()
            .map_err(|e| CoreError::validation(format!("unsupported currency {currency}: {e}")))?;
        let mut params = CreatePaymentIntent::new(amount_cents, currency);
        params.payment_method_types = Some(vec!["card".to_string()]);
        params.metadata = Some(metadata);

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| CoreError::gateway(format!("create payment intent: {e}")))?;
        Ok(Self::intent_view(intent))
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<GatewayIntent, CoreError> {
        let id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| CoreError::gateway(format!("malformed payment intent id {intent_id}: {e}")))?;
        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CoreError::gateway(format!("retrieve payment intent: {e}")))?;
        Ok(Self::intent_view(intent))
    }

    async fn refund_payment(&self, intent_id: &str) -> Result<GatewayRefund, CoreError> {
        let id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| CoreError::gateway(format!("malformed payment intent id {intent_id}: {e}")))?;
        let refund = Refund::create(
            &self.client,
            CreateRefund {
                payment_intent: Some(id),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| CoreError::gateway(format!("create refund: {e}")))?;
        Ok(GatewayRefund {
            id: refund.id.to_string(),
            status: refund
                .status
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn create_transfer(
        &self,
        amount_cents: i64,
        destination_account: &str,
    ) -> Result<GatewayTransfer, CoreError> {
        let mut params = CreateTransfer::new(Currency::USD, destination_account.to_string());
        params.amount = Some(amount_cents);
        let transfer = Transfer::create(&self.client, params)
            .await
            .map_err(|e| CoreError::gateway(format!("create transfer: {e}")))?;
        Ok(GatewayTransfer {
            id: transfer.id.to_string(),
        })
    }

    async fn create_customer(&self, email: &str, name: &str) -> Result<String, CoreError> {
        let customer = Customer::create(
            &self.client,
            CreateCustomer {
                email: Some(email),
                name: Some(name),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| CoreError::gateway(format!("create customer: {e}")))?;
        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> Result<GatewayCheckout, CoreError> {
        let customer = params
            .customer_id
            .as_deref()
            .map(|id| id.parse::<CustomerId>())
            .transpose()
            .map_err(|e| CoreError::gateway(format!("malformed customer id: {e}")))?;
        let mode = match params.mode {
            CheckoutMode::Payment => CheckoutSessionMode::Payment,
            CheckoutMode::Subscription => CheckoutSessionMode::Subscription,
        };

        let session_params = CreateCheckoutSession {
            customer,
            customer_email: params.customer_email.as_deref(),
            client_reference_id: params.client_reference_id.as_deref(),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(params.price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(mode),
            success_url: Some(&params.success_url),
            cancel_url: Some(&params.cancel_url),
            metadata: Some(params.metadata.clone()),
            allow_promotion_codes: Some(params.allow_promotion_codes),
            ..Default::default()
        };
        let session = CheckoutSession::create(&self.client, session_params)
            .await
            .map_err(|e| CoreError::gateway(format!("create checkout session: {e}")))?;
        Ok(GatewayCheckout {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, CoreError> {
        let id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| CoreError::gateway(format!("malformed subscription id {subscription_id}: {e}")))?;
        let sub = Subscription::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CoreError::gateway(format!("retrieve subscription: {e}")))?;
        Ok(Self::subscription_view(sub))
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, CoreError> {
        let id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| CoreError::gateway(format!("malformed subscription id {subscription_id}: {e}")))?;
        let sub = Subscription::update(
            &self.client,
            &id,
            UpdateSubscription {
                cancel_at_period_end: Some(cancel),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| CoreError::gateway(format!("update subscription: {e}")))?;
        Ok(Self::subscription_view(sub))
    }

    async fn create_connect_account(&self, email: &str) -> Result<String, CoreError> {
        let account = Account::create(
            &self.client,
            CreateAccount {
                type_: Some(AccountType::Express),
                email: Some(email),
                capabilities: Some(CreateAccountCapabilities {
                    transfers: Some(CreateAccountCapabilitiesTransfers {
                        requested: Some(true),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| CoreError::gateway(format!("create connect account: {e}")))?;
        Ok(account.id.to_string())
    }

    async fn create_account_link(&self, account_id: &str) -> Result<String, CoreError> {
        let id = account_id
            .parse::<AccountId>()
            .map_err(|e| CoreError::gateway(format!("malformed account id {account_id}: {e}")))?;
        let mut params = CreateAccountLink::new(id, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(&self.config.connect_refresh_url);
        params.return_url = Some(&self.config.connect_return_url);
        let link = AccountLink::create(&self.client, params)
            .await
            .map_err(|e| CoreError::gateway(format!("create account link: {e}")))?;
        Ok(link.url)
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, CoreError> {
        let id = account_id
            .parse::<AccountId>()
            .map_err(|e| CoreError::gateway(format!("malformed account id {account_id}: {e}")))?;
        let account = Account::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| CoreError::gateway(format!("retrieve account: {e}")))?;
        Ok(GatewayAccount {
            id: account.id.to_string(),
            payouts_enabled: account.payouts_enabled.unwrap_or(false),
        })
    }
}
