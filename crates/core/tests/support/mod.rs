#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Uuid;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use taskbay_core::booking::CreateBooking;
use taskbay_core::credits::{self, CreditTransactionKind};
use taskbay_core::error::CoreError;
use taskbay_core::gateway::{
    CheckoutParams, GatewayAccount, GatewayCheckout, GatewayIntent, GatewayRefund,
    GatewaySubscription, GatewayTransfer, PaymentGateway,
};
use taskbay_core::plans::PlanPrices;
use taskbay_core::schema::SCHEMA_STATEMENTS;
use taskbay_core::service::Service;
use taskbay_core::user::{User, UserRole};

static POOL: OnceCell<Option<PgPool>> = OnceCell::const_new();

/// All DB-backed tests run on this one shared runtime. With per-test
/// `#[tokio::test]` runtimes, connections in the shared pool die with the
/// runtime that created them, and every later acquire hangs on the pool's
/// health check until it times out (`PoolTimedOut`).
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    static RUNTIME: std::sync::OnceLock<tokio::runtime::Runtime> = std::sync::OnceLock::new();
    RUNTIME
        .get_or_init(|| tokio::runtime::Runtime::new().expect("shared test runtime"))
        .block_on(future)
}

/// Shared pool for DB-backed tests. `None` when TEST_DATABASE_URL is not set,
/// in which case the caller returns early and the test is a silent skip.
pub async fn test_pool() -> Option<&'static PgPool> {
    POOL.get_or_init(|| async {
        dotenv::dotenv().ok();
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("TEST_DATABASE_URL is set but not reachable");
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .expect("schema statement failed");
        }
        Some(pool)
    })
    .await
    .as_ref()
}

/// Scripted in-memory stand-in for the payment processor. Intents are held in
/// a map so tests can flip their status the way webhook-driving events would.
/// All generated ids carry a uuid so reruns against a persistent database
/// never collide on the unique gateway-reference columns.
pub struct MockGateway {
    intents: Mutex<HashMap<String, GatewayIntent>>,
    subscriptions: Mutex<HashMap<String, GatewaySubscription>>,
    created_intents: AtomicUsize,
    transfers_down: AtomicBool,
    payouts_enabled: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            created_intents: AtomicUsize::new(0),
            transfers_down: AtomicBool::new(false),
            payouts_enabled: AtomicBool::new(false),
        }
    }

    fn mock_id(prefix: &str) -> String {
        format!("{}_mock_{}", prefix, Uuid::new_v4().simple())
    }

    pub fn mark_intent(&self, intent_id: &str, status: &str) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status.to_string();
        }
    }

    pub fn forget_intent(&self, intent_id: &str) {
        self.intents.lock().unwrap().remove(intent_id);
    }

    pub fn put_subscription(&self, sub: GatewaySubscription) {
        self.subscriptions.lock().unwrap().insert(sub.id.clone(), sub);
    }

    pub fn intents_created(&self) -> usize {
        self.created_intents.load(Ordering::SeqCst)
    }

    pub fn break_transfers(&self) {
        self.transfers_down.store(true, Ordering::SeqCst);
    }

    pub fn enable_payouts(&self) {
        self.payouts_enabled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        _currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<GatewayIntent, CoreError> {
        let id = Self::mock_id("pi");
        let intent = GatewayIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: "requires_payment_method".to_string(),
            amount_cents,
            metadata,
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        self.created_intents.fetch_add(1, Ordering::SeqCst);
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<GatewayIntent, CoreError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| CoreError::gateway(format!("no such intent {intent_id}")))
    }

    async fn refund_payment(&self, intent_id: &str) -> Result<GatewayRefund, CoreError> {
        if !self.intents.lock().unwrap().contains_key(intent_id) {
            return Err(CoreError::gateway(format!("no such intent {intent_id}")));
        }
        Ok(GatewayRefund {
            id: Self::mock_id("re"),
            status: "succeeded".to_string(),
        })
    }

    async fn create_transfer(
        &self,
        _amount_cents: i64,
        _destination_account: &str,
    ) -> Result<GatewayTransfer, CoreError> {
        if self.transfers_down.load(Ordering::SeqCst) {
            return Err(CoreError::gateway("transfers are down"));
        }
        Ok(GatewayTransfer {
            id: Self::mock_id("tr"),
        })
    }

    async fn create_customer(&self, _email: &str, _name: &str) -> Result<String, CoreError> {
        Ok(Self::mock_id("cus"))
    }

    async fn create_checkout_session(
        &self,
        _params: CheckoutParams,
    ) -> Result<GatewayCheckout, CoreError> {
        let id = Self::mock_id("cs");
        Ok(GatewayCheckout {
            url: Some(format!("https://checkout.mock/{id}")),
            id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, CoreError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| CoreError::gateway(format!("no such subscription {subscription_id}")))
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, CoreError> {
        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs
            .get_mut(subscription_id)
            .ok_or_else(|| CoreError::gateway(format!("no such subscription {subscription_id}")))?;
        sub.cancel_at_period_end = cancel;
        Ok(sub.clone())
    }

    async fn create_connect_account(&self, _email: &str) -> Result<String, CoreError> {
        Ok(Self::mock_id("acct"))
    }

    async fn create_account_link(&self, account_id: &str) -> Result<String, CoreError> {
        Ok(format!("https://connect.mock/{account_id}"))
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, CoreError> {
        Ok(GatewayAccount {
            id: account_id.to_string(),
            payouts_enabled: self.payouts_enabled.load(Ordering::SeqCst),
        })
    }
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}+{}@example.com", prefix, Uuid::new_v4().simple())
}

pub async fn create_user(pool: &PgPool, role: UserRole) -> User {
    User::new(unique_email("test"), "Test User".to_string(), role)
        .create(pool)
        .await
        .expect("create user")
}

pub async fn create_customer_with_credits(pool: &PgPool, credits: i64) -> User {
    let user = create_user(pool, UserRole::Customer).await;
    if credits == 0 {
        return user;
    }
    grant(pool, user.id, credits).await
}

/// Grants through the ledger so the credits-equal-ledger-sum invariant holds
/// for fixture users too.
pub async fn grant(pool: &PgPool, user_id: Uuid, amount: i64) -> User {
    let mut tx = pool.begin().await.expect("begin");
    let user = credits::grant_credits(
        &mut tx,
        user_id,
        amount,
        CreditTransactionKind::Adjustment,
        "Test grant".to_string(),
        None,
    )
    .await
    .expect("grant credits");
    tx.commit().await.expect("commit");
    user
}

pub async fn create_service(pool: &PgPool, provider: &User, price_cents: i64) -> Service {
    Service::new(
        provider.id,
        "Deep Cleaning".to_string(),
        "Two-hour deep clean of the whole flat".to_string(),
        price_cents,
    )
    .create(pool)
    .await
    .expect("create service")
}

pub fn booking_request(service: &Service) -> CreateBooking {
    CreateBooking {
        service_id: service.id,
        service_option: "standard".to_string(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date"),
        time_slot: "09:00-11:00".to_string(),
        address: "1 Test Street".to_string(),
        notes: None,
    }
}

pub fn plan_prices() -> PlanPrices {
    PlanPrices::new("price_regular_test".into(), "price_premium_test".into())
}

pub fn gateway_subscription(customer_id: &str, price_id: &str, status: &str) -> GatewaySubscription {
    GatewaySubscription {
        id: MockGateway::mock_id("sub"),
        customer_id: customer_id.to_string(),
        status: status.to_string(),
        price_id: Some(price_id.to_string()),
        current_period_start: Some(Utc::now()),
        current_period_end: Some(Utc::now() + chrono::Duration::days(30)),
        trial_start: None,
        trial_end: None,
        cancel_at_period_end: false,
    }
}

pub async fn ledger_sum(pool: &PgPool, user_id: Uuid) -> i64 {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_transactions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("ledger sum");
    sum
}

pub async fn wallet_tx_sum(pool: &PgPool, wallet_id: Uuid) -> i64 {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM wallet_transactions WHERE wallet_id = $1 AND status = 'completed'",
    )
    .bind(wallet_id)
    .fetch_one(pool)
    .await
    .expect("wallet sum");
    sum
}
