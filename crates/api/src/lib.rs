mod env;
mod global_state;
mod middleware;
mod response;
mod utils;
mod routes;

pub use routes::{
    auth_routes,
    booking_routes,
    credit_routes,
    misc_routes,
    payment_routes,
    service_routes,
    stripe_routes,
    subscription_routes,
    wallet_routes,
};

pub use env::ApiServerEnv;
pub use global_state::GlobalState;
pub use middleware::{authenticate, ensure_account};
pub use response::{AppError, AppSuccess};
pub use utils::setup_tracing;
