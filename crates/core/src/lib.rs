pub mod booking;
pub mod credits;
pub mod error;
pub mod escrow;
pub mod gateway;
pub mod plans;
pub mod policy;
pub mod reconcile;
pub mod refs;
pub mod schema;
pub mod service;
pub mod subscription;
pub mod user;
pub mod wallet;

pub use booking::{Booking, BookingPaymentStatus, BookingStatus, BookingView, CreateBooking};
pub use credits::{CreditTransaction, CreditTransactionKind, BOOKING_CREDIT_COST, REGISTRATION_BONUS_CREDITS};
pub use error::CoreError;
pub use escrow::{Payment, PaymentStatus};
pub use gateway::{PaymentGateway, StripeGateway};
pub use plans::{CreditPackage, Plan, PlanKind, PlanPrices, CREDIT_PACKAGES, PLANS};
pub use policy::{Action, Resource};
pub use refs::{HasId, Ref};
pub use service::Service;
pub use subscription::Subscription;
pub use user::{User, UserRole};
pub use wallet::{Wallet, WalletTransaction, WalletTransactionKind, WalletTransactionStatus, WalletUserType};
