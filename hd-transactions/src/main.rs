//! Pending Transactions Demo
//!
//! Runs the pending transaction manager against the in-process server with
//! a customer support grant waiting, then prints what the user received.

use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hd_transactions::{
    core::{currency::CurrencyKind, happy_hour::NoHappyHour},
    economy::{ChannelSaver, FeatureFlags, InMemoryProfile, ManagerConfig, SceneFlag},
    network::OfflineServer,
    Collaborators, TransactionManager, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Hungry Dragon pending transactions v{}", VERSION);

    let config = ManagerConfig::from_env()?;
    let features = FeatureFlags::from_env()?;
    info!("Poll interval: {:?}", config.poll_interval);
    info!("Server confirmation required: {}", features.pending_transactions_server_confirm);

    let server = OfflineServer::new();
    server.push_pending(json!({
        "order_id": "cs-0001",
        "source": "crm",
        "sc": "1500",
        "hc": "25",
        "items": [{ "sku": "dragon_skin_01", "type": "skin", "amount": "1" }]
    }));

    let profile = Arc::new(InMemoryProfile::new());
    let (saver, mut save_requests) = ChannelSaver::new();

    // Persistence task: a real client writes the profile to disk here
    let persistence_task = tokio::spawn(async move {
        let mut saves = 0usize;
        while save_requests.recv().await.is_some() {
            saves += 1;
            info!("Profile saved ({})", saves);
        }
        saves
    });

    let deps = Collaborators {
        server: Arc::new(server.clone()),
        profile: profile.clone(),
        persistence: Arc::new(saver),
        features: Arc::new(features),
        flow: Arc::new(SceneFlag::new()),
        gems: Arc::new(NoHappyHour),
    };

    let manager = TransactionManager::new(config, deps);
    let handle = manager.handle();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.urge_request();
    tokio::time::sleep(Duration::from_millis(500)).await;

    request_shutdown(&shutdown_tx);
    task.await?;

    // The manager owned the last sender, the persistence task ends here
    let saves = persistence_task.await?;

    // Rewards are queued until the reward flow collects them
    while let Some(reward) = profile.collect_next_reward() {
        info!("Collected {:?} ({:?})", reward.kind, reward.economy_group);
    }

    info!("=== Profile ===");
    for currency in [CurrencyKind::Soft, CurrencyKind::Hard, CurrencyKind::GoldenFragments] {
        info!("{:?}: {}", currency, profile.balance(currency));
    }
    for (sku, item_type) in profile.items() {
        info!("Item {} ({})", sku, item_type);
    }
    info!("Saves requested: {}", saves);
    info!("Still pending on server: {}", server.pending_count());

    Ok(())
}

/// Signal every task listening on `shutdown_tx`. Returns whether anyone was
/// still listening.
fn request_shutdown(shutdown_tx: &broadcast::Sender<()>) -> bool {
    if shutdown_tx.send(()).is_err() {
        warn!("Transaction manager stopped before shutdown was requested");
        return false;
    }
    true
}
