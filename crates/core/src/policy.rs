use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

use crate::booking::Booking;
use crate::error::CoreError;
use crate::escrow::Payment;
use crate::user::{User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Booking,
    Payment,
    Wallet,
    Subscription,
    CreditLedger,
    Service,
}

impl Resource {
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Booking => "booking",
            Resource::Payment => "payment",
            Resource::Wallet => "wallet",
            Resource::Subscription => "subscription",
            Resource::CreditLedger => "credit ledger",
            Resource::Service => "service",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Release,
    Refund,
    Deposit,
    Withdraw,
    Connect,
    Checkout,
}

/// The whole access policy as one lookup table. Row-level ownership is a
/// separate question, answered by [`OwnershipChecker`].
pub fn is_permitted(role: UserRole, resource: Resource, action: Action) -> bool {
    use Action::*;
    use Resource::*;
    use UserRole::*;

    match (role, resource, action) {
        (Admin, _, _) => true,
        (_, Service, Read) => true,
        (_, CreditLedger, Read) => true,
        (Customer, Booking, Create | Read | Update) => true,
        (Customer, Payment, Create | Read) => true,
        (Customer, Wallet, Read | Deposit) => true,
        (Customer, Subscription, Checkout | Read | Update) => true,
        (Provider, Booking, Read | Update) => true,
        (Provider, Payment, Read) => true,
        (Provider, Wallet, Read | Withdraw | Connect) => true,
        (Provider, Service, Create) => true,
        _ => false,
    }
}

pub fn ensure_permitted(user: &User, resource: Resource, action: Action) -> Result<(), CoreError> {
    if is_permitted(user.role, resource, action) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(resource.name()))
    }
}

/// Row-level ownership check for one resource kind. `Err(NotFound)` when the
/// row does not exist, so callers can keep 404 and 403 distinct.
#[async_trait]
pub trait OwnershipChecker: Send + Sync {
    async fn is_owner(&self, pool: &PgPool, user: &User, id: Uuid) -> Result<bool, CoreError>;
}

struct BookingOwnership;

#[async_trait]
impl OwnershipChecker for BookingOwnership {
    async fn is_owner(&self, pool: &PgPool, user: &User, id: Uuid) -> Result<bool, CoreError> {
        let booking = Booking::find_by_id(pool, id)
            .await?
            .ok_or(CoreError::NotFound("booking"))?;
        Ok(booking.customer_id == user.id || booking.provider_id == user.id)
    }
}

struct PaymentOwnership;

#[async_trait]
impl OwnershipChecker for PaymentOwnership {
    async fn is_owner(&self, pool: &PgPool, user: &User, id: Uuid) -> Result<bool, CoreError> {
        let payment = Payment::find_by_id(pool, id)
            .await?
            .ok_or(CoreError::NotFound("payment"))?;
        Ok(payment.customer_id == user.id || payment.provider_id == user.id)
    }
}

struct WalletOwnership;

#[async_trait]
impl OwnershipChecker for WalletOwnership {
    async fn is_owner(&self, pool: &PgPool, user: &User, id: Uuid) -> Result<bool, CoreError> {
        let owner_id: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM wallets WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        let (owner_id,) = owner_id.ok_or(CoreError::NotFound("wallet"))?;
        Ok(owner_id == user.id)
    }
}

fn ownership_checker(resource: Resource) -> Option<&'static dyn OwnershipChecker> {
    match resource {
        Resource::Booking => Some(&BookingOwnership),
        Resource::Payment => Some(&PaymentOwnership),
        Resource::Wallet => Some(&WalletOwnership),
        _ => None,
    }
}

/// Admins see everything; everyone else must be a party to the row.
/// Resources without an ownership rule are denied outright.
pub async fn ensure_owner(
    pool: &PgPool,
    user: &User,
    resource: Resource,
    id: Uuid,
) -> Result<(), CoreError> {
    if user.role == UserRole::Admin {
        return Ok(());
    }
    let Some(checker) = ownership_checker(resource) else {
        return Err(CoreError::Forbidden(resource.name()));
    };
    if checker.is_owner(pool, user, id).await? {
        Ok(())
    } else {
        Err(CoreError::Forbidden(resource.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_unrestricted() {
        for resource in [
            Resource::Booking,
            Resource::Payment,
            Resource::Wallet,
            Resource::Subscription,
            Resource::CreditLedger,
            Resource::Service,
        ] {
            assert!(is_permitted(UserRole::Admin, resource, Action::Release));
            assert!(is_permitted(UserRole::Admin, resource, Action::Read));
        }
    }

    #[test]
    fn only_admin_settles_payments() {
        for role in [UserRole::Customer, UserRole::Provider] {
            assert!(!is_permitted(role, Resource::Payment, Action::Release));
            assert!(!is_permitted(role, Resource::Payment, Action::Refund));
        }
        assert!(is_permitted(UserRole::Admin, Resource::Payment, Action::Release));
    }

    #[test]
    fn booking_creation_is_customer_only() {
        assert!(is_permitted(UserRole::Customer, Resource::Booking, Action::Create));
        assert!(!is_permitted(UserRole::Provider, Resource::Booking, Action::Create));
    }

    #[test]
    fn wallet_directions_split_by_role() {
        assert!(is_permitted(UserRole::Customer, Resource::Wallet, Action::Deposit));
        assert!(!is_permitted(UserRole::Customer, Resource::Wallet, Action::Withdraw));
        assert!(is_permitted(UserRole::Provider, Resource::Wallet, Action::Withdraw));
        assert!(!is_permitted(UserRole::Provider, Resource::Wallet, Action::Deposit));
        assert!(is_permitted(UserRole::Provider, Resource::Wallet, Action::Connect));
    }

    #[test]
    fn services_are_publicly_readable() {
        for role in [UserRole::Customer, UserRole::Provider, UserRole::Admin] {
            assert!(is_permitted(role, Resource::Service, Action::Read));
        }
        assert!(!is_permitted(UserRole::Customer, Resource::Service, Action::Create));
    }

    #[test]
    fn subscriptions_are_for_customers() {
        assert!(is_permitted(UserRole::Customer, Resource::Subscription, Action::Checkout));
        assert!(!is_permitted(UserRole::Provider, Resource::Subscription, Action::Checkout));
    }
}
