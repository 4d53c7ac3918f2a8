//! transfer_core - Money-transfer core service
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌─────────────┐
//! │  Config  │───▶│  PostgreSQL  │───▶│ PaymentCore │
//! │  (YAML)  │    │ (migrations) │    │ + sweeper   │
//! └──────────┘    └──────────────┘    └─────────────┘
//! ```
//!
//! Runs the money request expiry sweeper until Ctrl-C. The HTTP layer links
//! the library and drives [`PaymentCore`] directly.
//!
//! Flags:
//! - `--env/-e <name>`: load `config/<name>.yaml` (default `dev`)
//! - `--hash-pin <pin>`: print an argon2 PHC hash for provisioning and exit
//! - `--status`: print the public transfer status as JSON and exit

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

use transfer_core::config::AppConfig;
use transfer_core::credentials::{Pin, hash_pin};
use transfer_core::db::Database;
use transfer_core::notify::{FanoutNotifier, LogNotifier, NotificationDispatcher, PushNotifier};
use transfer_core::service::PaymentCore;
use transfer_core::store::Stores;
use transfer_core::store::postgres::PgStore;
use transfer_core::worker::{ExpirySweeper, SweeperConfig};

fn flag_value(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_env() -> String {
    flag_value(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn status_only() -> bool {
    std::env::args().any(|a| a == "--status")
}

fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    let currency = &config.transfer.currency;
    let log: Arc<dyn NotificationDispatcher> = Arc::new(LogNotifier::new(currency.clone()));

    match &config.notifications.push_endpoint {
        Some(endpoint) => {
            let push = PushNotifier::new(
                endpoint.clone(),
                config.notifications.timeout(),
                currency.clone(),
            )?;
            tracing::info!(endpoint = %push.endpoint(), "Push notifications enabled");
            Ok(Arc::new(FanoutNotifier::new(vec![log, Arc::new(push)])))
        }
        None => Ok(log),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // needs no config, database or logging
    if let Some(pin) = flag_value(&["--hash-pin"]) {
        println!("{}", hash_pin(&Pin::new(pin))?.as_str());
        return Ok(());
    }

    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = transfer_core::logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        "Starting transfer_core in {} mode",
        env
    );

    let url = app_config
        .postgres_url
        .clone()
        .context("postgres_url is not configured (set it in the config file or DATABASE_URL)")?;
    let db = Database::connect_with(&url, &app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.migrate().await.context("Failed to apply migrations")?;
    db.health_check().await?;

    let store = Arc::new(PgStore::new(db.pool().clone()));
    let core = PaymentCore::with_hashed_pins(
        Stores::from_shared(store),
        build_notifier(&app_config)?,
        &app_config.transfer,
    );

    let status = core.public_status().await?;
    if status_only() {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    tracing::info!(
        transactions_enabled = status.transactions_enabled,
        "Payment core ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        core.money_requests(),
        SweeperConfig::from(&app_config.money_requests),
    );
    let sweeper_handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    // the receiver may already be gone if the sweeper exited
    let _ = shutdown_tx.send(true);
    sweeper_handle.await?;

    tracing::info!("transfer_core stopped");
    Ok(())
}
