mod auth;
mod bookings;
mod credits;
mod misc;
mod payments;
mod services;
mod stripe;
mod subscriptions;
mod wallet;

pub use auth::auth_routes;
pub use bookings::booking_routes;
pub use credits::credit_routes;
pub use misc::misc_routes;
pub use payments::payment_routes;
pub use services::service_routes;
pub use self::stripe::stripe_routes;
pub use subscriptions::subscription_routes;
pub use wallet::wallet_routes;
