use taskbay_common::EnvVars;

pub struct ApiServerEnv {
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_regular_price_id: String,
    pub stripe_premium_price_id: String,
    pub connect_refresh_url: String,
    pub connect_return_url: String,
}

impl EnvVars for ApiServerEnv {
    fn load() -> Self {
        Self {
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap(),
            stripe_regular_price_id: std::env::var("STRIPE_REGULAR_PRICE_ID").unwrap(),
            stripe_premium_price_id: std::env::var("STRIPE_PREMIUM_PRICE_ID").unwrap(),
            connect_refresh_url: std::env::var("CONNECT_REFRESH_URL").unwrap(),
            connect_return_url: std::env::var("CONNECT_RETURN_URL").unwrap(),
        }
    }

    fn get_env_var(&self, key: &str) -> String {
        match key {
            "STRIPE_SECRET_KEY" => self.stripe_secret_key.clone(),
            "STRIPE_WEBHOOK_SECRET" => self.stripe_webhook_secret.clone(),
            "STRIPE_REGULAR_PRICE_ID" => self.stripe_regular_price_id.clone(),
            "STRIPE_PREMIUM_PRICE_ID" => self.stripe_premium_price_id.clone(),
            "CONNECT_REFRESH_URL" => self.connect_refresh_url.clone(),
            "CONNECT_RETURN_URL" => self.connect_return_url.clone(),
            _ => panic!("{} is not set", key),
        }
    }
}
