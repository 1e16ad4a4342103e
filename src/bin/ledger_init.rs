//! Ledger initialization binary.
//!
//! Creates the schema, seeds the ratio table from configuration on first
//! start and logs the tiers in effect.

use tracing::{error, info};

use loyalty_ledger::config::Config;
use loyalty_ledger::utils::bootstrap::init_tracing;
use loyalty_ledger::LoyaltyLedger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        "Storage: {} at {}",
        config.storage.storage_type, config.storage.path
    );

    let ledger = LoyaltyLedger::open(&config).await.map_err(|e| {
        error!("Failed to initialize ledger: {}", e);
        e
    })?;

    let snapshot = ledger.current_ratios().await;
    for tier in &snapshot.tiers {
        info!(tier = tier.key, fraction = %tier.fraction, "Ratio tier");
    }
    info!("Ledger initialized");

    Ok(())
}
