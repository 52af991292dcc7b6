use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Recurring plan tier. Stored on users and subscriptions as text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanKind {
    Regular,
    Premium,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub kind: PlanKind,
    pub price_cents: i64,
    /// Granted once when the subscription is created.
    pub initial_credits: i64,
    /// Granted on every paid billing cycle after the first invoice.
    pub recurring_credits: i64,
}

pub const PLANS: &[Plan] = &[
    Plan {
        kind: PlanKind::Regular,
        price_cents: 999,
        initial_credits: 50,
        recurring_credits: 50,
    },
    Plan {
        kind: PlanKind::Premium,
        price_cents: 1999,
        initial_credits: 120,
        recurring_credits: 120,
    },
];

/// Stripe price ids for the recurring plans. These differ per environment,
/// so they load from `STRIPE_REGULAR_PRICE_ID` / `STRIPE_PREMIUM_PRICE_ID`
/// rather than living in the table above.
#[derive(Debug, Clone)]
pub struct PlanPrices {
    pub regular: String,
    pub premium: String,
}

impl PlanPrices {
    pub fn new(regular: String, premium: String) -> Self {
        Self { regular, premium }
    }

    pub fn price_id(&self, kind: PlanKind) -> &str {
        match kind {
            PlanKind::Regular => &self.regular,
            PlanKind::Premium => &self.premium,
        }
    }

    pub fn kind_for_price(&self, stripe_price_id: &str) -> Option<PlanKind> {
        if stripe_price_id == self.regular {
            Some(PlanKind::Regular)
        } else if stripe_price_id == self.premium {
            Some(PlanKind::Premium)
        } else {
            None
        }
    }
}

/// One-off credit bundles sold through one-time checkout sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: i64,
    pub price_cents: i64,
    pub stripe_price_id: &'static str,
}

pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter",
        name: "Starter",
        credits: 20,
        price_cents: 499,
        stripe_price_id: "price_1QxTc2JN2yFwZN4qStarter0",
    },
    CreditPackage {
        id: "standard",
        name: "Standard",
        credits: 50,
        price_cents: 999,
        stripe_price_id: "price_1QxTc2JN2yFwZN4qStandard",
    },
    CreditPackage {
        id: "value",
        name: "Value",
        credits: 120,
        price_cents: 1999,
        stripe_price_id: "price_1QxTc2JN2yFwZN4qValue00",
    },
];

pub fn plan(kind: PlanKind) -> &'static Plan {
    // Both variants are present in PLANS, so the lookup cannot miss.
    PLANS
        .iter()
        .find(|p| p.kind == kind)
        .unwrap_or(&PLANS[0])
}

pub fn find_package(id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|p| p.id == id)
}
