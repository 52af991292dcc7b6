mod support;

use sqlx::types::Uuid;
use taskbay_core::error::CoreError;
use taskbay_core::user::UserRole;
use taskbay_core::wallet::{self, WalletTransactionKind};

use support::MockGateway;

#[test]
fn a_deposit_is_credited_only_after_the_gateway_succeeds() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let customer = support::create_user(pool, UserRole::Customer).await;

        let intent = wallet::start_deposit(pool, &gateway, &customer, 2000)
            .await
            .expect("open deposit");
        assert!(intent.client_secret.is_some());

        // The intent has not succeeded yet, so the claim is rejected.
        let err = wallet::confirm_deposit(pool, &gateway, &customer, &intent.id)
            .await
            .expect_err("nothing settled yet");
        assert!(matches!(err, CoreError::InvalidState(_)));

        gateway.mark_intent(&intent.id, "succeeded");
        let (funded, entry) = wallet::confirm_deposit(pool, &gateway, &customer, &intent.id)
            .await
            .expect("confirm");
        assert_eq!(funded.balance_cents, 2000);
        assert_eq!(entry.kind, WalletTransactionKind::Deposit);
        assert_eq!(entry.amount_cents, 2000);
        assert_eq!(entry.external_reference.as_deref(), Some(intent.id.as_str()));
        assert_eq!(support::wallet_tx_sum(pool, funded.id).await, funded.balance_cents);
    })
}

#[test]
fn a_replayed_deposit_confirm_credits_nothing() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let customer = support::create_user(pool, UserRole::Customer).await;

        let intent = wallet::start_deposit(pool, &gateway, &customer, 2000)
            .await
            .expect("open deposit");
        gateway.mark_intent(&intent.id, "succeeded");
        wallet::confirm_deposit(pool, &gateway, &customer, &intent.id)
            .await
            .expect("first confirm");

        let err = wallet::confirm_deposit(pool, &gateway, &customer, &intent.id)
            .await
            .expect_err("second confirm is a replay");
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert!(err.to_string().contains("already been recorded"));

        let (after, transactions) = wallet::get_wallet_overview(pool, &customer)
            .await
            .expect("overview");
        assert_eq!(after.balance_cents, 2000);
        let deposits = transactions
            .iter()
            .filter(|t| t.kind == WalletTransactionKind::Deposit)
            .count();
        assert_eq!(deposits, 1);
    })
}

#[test]
fn a_deposit_cannot_be_claimed_by_someone_else() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let owner = support::create_user(pool, UserRole::Customer).await;
        let thief = support::create_user(pool, UserRole::Customer).await;

        let intent = wallet::start_deposit(pool, &gateway, &owner, 2000)
            .await
            .expect("open deposit");
        gateway.mark_intent(&intent.id, "succeeded");

        let err = wallet::confirm_deposit(pool, &gateway, &thief, &intent.id)
            .await
            .expect_err("intent belongs to the owner");
        assert!(matches!(err, CoreError::Forbidden(_)));

        let (owner_wallet, _) = wallet::get_wallet_overview(pool, &owner).await.expect("overview");
        assert_eq!(owner_wallet.balance_cents, 0);
    })
}

#[test]
fn withdrawal_needs_a_connected_account_and_funds() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let provider = support::create_user(pool, UserRole::Provider).await;

        let err = wallet::withdraw(pool, &gateway, &provider, 500)
            .await
            .expect_err("no payout account yet");
        assert!(matches!(err, CoreError::InvalidState(_)));

        let onboarding = wallet::connect_bank_account(pool, &gateway, &provider)
            .await
            .expect("connect");
        assert!(onboarding.contains("connect.mock"));

        // Onboarding started but payouts are not enabled yet.
        let err = wallet::withdraw(pool, &gateway, &provider, 500)
            .await
            .expect_err("bank account not connected");
        assert!(matches!(err, CoreError::InvalidState(_)));

        gateway.enable_payouts();
        let refreshed = wallet::refresh_connect_status(pool, &gateway, &provider)
            .await
            .expect("refresh");
        assert!(refreshed.bank_account_connected);

        let err = wallet::withdraw(pool, &gateway, &provider, 500)
            .await
            .expect_err("empty wallet");
        match err {
            CoreError::InsufficientFunds { requested, available } => {
                assert_eq!(requested, 500);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        let (after, _) = wallet::get_wallet_overview(pool, &provider).await.expect("overview");
        assert_eq!(after.balance_cents, 0);
    })
}

#[test]
fn withdrawal_moves_money_out_through_a_transfer() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let provider = support::create_user(pool, UserRole::Provider).await;

        // Fund the wallet the way a released booking payment does.
        let mut tx = pool.begin().await.expect("begin");
        wallet::credit_service_payment(
            &mut tx,
            provider.id,
            5000,
            Uuid::new_v4(),
            "Service payment for booking test".to_string(),
        )
        .await
        .expect("credit");
        tx.commit().await.expect("commit");

        wallet::connect_bank_account(pool, &gateway, &provider)
            .await
            .expect("connect");
        gateway.enable_payouts();
        wallet::refresh_connect_status(pool, &gateway, &provider)
            .await
            .expect("refresh");

        let (after, entry) = wallet::withdraw(pool, &gateway, &provider, 3000)
            .await
            .expect("withdraw");
        assert_eq!(after.balance_cents, 2000);
        assert_eq!(entry.kind, WalletTransactionKind::Withdrawal);
        assert_eq!(entry.amount_cents, -3000);
        assert!(entry.external_reference.is_some());
        assert_eq!(support::wallet_tx_sum(pool, after.id).await, after.balance_cents);
    })
}

#[test]
fn a_failed_transfer_leaves_the_wallet_untouched() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let provider = support::create_user(pool, UserRole::Provider).await;

        let mut tx = pool.begin().await.expect("begin");
        wallet::credit_service_payment(
            &mut tx,
            provider.id,
            5000,
            Uuid::new_v4(),
            "Service payment for booking test".to_string(),
        )
        .await
        .expect("credit");
        tx.commit().await.expect("commit");

        wallet::connect_bank_account(pool, &gateway, &provider)
            .await
            .expect("connect");
        gateway.enable_payouts();
        wallet::refresh_connect_status(pool, &gateway, &provider)
            .await
            .expect("refresh");

        gateway.break_transfers();
        let err = wallet::withdraw(pool, &gateway, &provider, 1000)
            .await
            .expect_err("gateway is down");
        assert!(matches!(err, CoreError::Gateway(_)));

        let (after, transactions) = wallet::get_wallet_overview(pool, &provider)
            .await
            .expect("overview");
        assert_eq!(after.balance_cents, 5000);
        assert!(transactions
            .iter()
            .all(|t| t.kind != WalletTransactionKind::Withdrawal));
    })
}

#[test]
fn deposits_are_a_customer_thing_and_withdrawals_a_provider_thing() {
    support::block_on(async {
        let Some(pool) = support::test_pool().await else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return;
        };
        let gateway = MockGateway::new();
        let customer = support::create_user(pool, UserRole::Customer).await;
        let provider = support::create_user(pool, UserRole::Provider).await;

        let err = wallet::start_deposit(pool, &gateway, &provider, 1000)
            .await
            .expect_err("providers do not deposit");
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = wallet::withdraw(pool, &gateway, &customer, 1000)
            .await
            .expect_err("customers do not withdraw");
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = wallet::start_deposit(pool, &gateway, &customer, 0)
            .await
            .expect_err("zero deposit");
        assert!(matches!(err, CoreError::Validation(_)));
    })
}
