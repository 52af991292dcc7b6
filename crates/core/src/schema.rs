//! DDL for every table this crate owns, executed in order on startup via
//! `taskbay_database::init_tables`. All statements are idempotent.
//!
//! Enum-typed columns are plain TEXT; the Rust side constrains the values
//! (see the `sqlx::Type` derives on the status enums).

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        role TEXT NOT NULL,
        credits BIGINT NOT NULL DEFAULT 0,
        subscription_type TEXT,
        subscription_status TEXT,
        trial_ends_at TIMESTAMPTZ,
        next_billing_date TIMESTAMPTZ,
        stripe_customer_id TEXT,
        stripe_subscription_id TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS users_stripe_customer_id_idx ON users (stripe_customer_id)",
    r#"
    CREATE TABLE IF NOT EXISTS services (
        id UUID PRIMARY KEY,
        provider_id UUID NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        price_cents BIGINT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS services_provider_id_idx ON services (provider_id)",
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id UUID PRIMARY KEY,
        service_id UUID NOT NULL,
        customer_id UUID NOT NULL,
        provider_id UUID NOT NULL,
        service_option TEXT NOT NULL,
        price_cents BIGINT NOT NULL,
        date DATE NOT NULL,
        time_slot TEXT NOT NULL,
        address TEXT NOT NULL,
        notes TEXT,
        status TEXT NOT NULL,
        payment_status TEXT NOT NULL,
        payment_id UUID,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS bookings_customer_id_idx ON bookings (customer_id)",
    "CREATE INDEX IF NOT EXISTS bookings_provider_id_idx ON bookings (provider_id)",
    r#"
    CREATE TABLE IF NOT EXISTS payments (
        id UUID PRIMARY KEY,
        booking_id UUID NOT NULL UNIQUE,
        customer_id UUID NOT NULL,
        provider_id UUID NOT NULL,
        amount_cents BIGINT NOT NULL,
        currency TEXT NOT NULL,
        status TEXT NOT NULL,
        stripe_payment_intent_id TEXT UNIQUE,
        stripe_refund_id TEXT,
        release_date TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS payments_status_updated_at_idx ON payments (status, updated_at)",
    r#"
    CREATE TABLE IF NOT EXISTS credit_transactions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        amount BIGINT NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        reference TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS credit_transactions_user_id_idx ON credit_transactions (user_id)",
    // Backs grant_credits_once: one ledger entry per reference, ever.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS credit_transactions_reference_key
        ON credit_transactions (reference) WHERE reference IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wallets (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE,
        user_type TEXT NOT NULL,
        balance_cents BIGINT NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        stripe_account_id TEXT,
        stripe_customer_id TEXT,
        bank_account_connected BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wallet_transactions (
        id UUID PRIMARY KEY,
        wallet_id UUID NOT NULL,
        user_id UUID NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        amount_cents BIGINT NOT NULL,
        description TEXT NOT NULL,
        booking_id UUID,
        external_reference TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS wallet_transactions_wallet_id_idx ON wallet_transactions (wallet_id)",
    // Full unique index (not partial): the deposit path upserts with
    // ON CONFLICT (external_reference), and NULLs never collide.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS wallet_transactions_external_reference_key
        ON wallet_transactions (external_reference)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        subscription_type TEXT NOT NULL,
        stripe_subscription_id TEXT NOT NULL UNIQUE,
        stripe_customer_id TEXT NOT NULL,
        status TEXT NOT NULL,
        cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
        current_period_start TIMESTAMPTZ,
        current_period_end TIMESTAMPTZ,
        trial_start TIMESTAMPTZ,
        trial_end TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS subscriptions_user_id_idx ON subscriptions (user_id)",
];
