use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use taskbay_common::ModuleClient;
use taskbay_core::reconcile::{self, ReconcileConfig, DEFAULT_STALE_AFTER, DEFAULT_SWEEP_INTERVAL};
use taskbay_core::schema::SCHEMA_STATEMENTS;
use taskbay_database::init_tables;
use taskbay_service_api::{
    auth_routes, booking_routes, credit_routes, misc_routes, payment_routes, service_routes,
    setup_tracing, stripe_routes, subscription_routes, wallet_routes, GlobalState,
};

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let cors = CorsLayer::very_permissive();
    let trace = TraceLayer::new_for_http();

    let global_state = GlobalState::new().await?;
    init_tables(global_state.db.get_client(), SCHEMA_STATEMENTS).await?;

    // Repairs payments stuck in `processing` when a webhook never arrived.
    // The first tick fires immediately, so every boot starts with a sweep.
    let sweep_interval = env_duration("RECONCILE_INTERVAL", DEFAULT_SWEEP_INTERVAL);
    let config = ReconcileConfig {
        stale_after: env_duration("RECONCILE_STALE_AFTER", DEFAULT_STALE_AFTER),
        ..ReconcileConfig::default()
    };
    let reconcile_state = global_state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let sweep = reconcile::run_reconciliation(
                reconcile_state.db.get_client(),
                reconcile_state.gateway.as_ref(),
                &config,
            )
            .await;
            match sweep {
                Ok(report) => {
                    if report.scanned > 0 {
                        tracing::info!(
                            "[reconcile] scanned {} repaired {} unchanged {} failed {}",
                            report.scanned,
                            report.repaired,
                            report.unchanged,
                            report.failed
                        );
                    }
                }
                Err(e) => tracing::error!("[reconcile] sweep failed: {:?}", e),
            }
        }
    });

    let app = Router::new()
        .merge(misc_routes())
        .merge(auth_routes())
        .merge(service_routes())
        .merge(booking_routes())
        .merge(payment_routes())
        .merge(credit_routes())
        .merge(wallet_routes())
        .merge(subscription_routes())
        .merge(stripe_routes())
        .layer(TimeoutLayer::new(Duration::from_secs(3600)))
        .layer(cors)
        .layer(trace)
        .with_state(global_state);

    let port: u16 = std::env::var("PORT")
        .unwrap_or("3030".into())
        .parse()
        .expect("failed to convert to number");

    let listener = tokio::net::TcpListener::bind(format!(":::{port}"))
        .await
        .unwrap();

    tracing::info!("LISTENING ON {port}");
    axum::serve(listener, app.into_make_service()).await.unwrap();
    Ok(())
}
