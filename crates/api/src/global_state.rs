use std::sync::Arc;

use anyhow::Result;

use taskbay_common::{EnvVars, ModuleClient};
use taskbay_core::gateway::StripeConfig;
use taskbay_core::{PlanPrices, StripeGateway};
use taskbay_database::PostgresClient;

use crate::env::ApiServerEnv;

#[derive(Clone)]
pub struct GlobalState {
    pub db: PostgresClient,
    pub gateway: Arc<StripeGateway>,
    pub plan_prices: PlanPrices,
}

impl GlobalState {
    pub async fn new() -> Result<Self> {
        let env = ApiServerEnv::load();
        let db = PostgresClient::setup_connection().await;

        let gateway = Arc::new(StripeGateway::new(StripeConfig {
            secret_key: env.get_env_var("STRIPE_SECRET_KEY"),
            webhook_secret: env.get_env_var("STRIPE_WEBHOOK_SECRET"),
            connect_refresh_url: env.get_env_var("CONNECT_REFRESH_URL"),
            connect_return_url: env.get_env_var("CONNECT_RETURN_URL"),
        }));
        let plan_prices = PlanPrices::new(
            env.get_env_var("STRIPE_REGULAR_PRICE_ID"),
            env.get_env_var("STRIPE_PREMIUM_PRICE_ID"),
        );

        Ok(Self {
            db,
            gateway,
            plan_prices,
        })
    }
}
