//! Ledger facade for in-process library usage.
//!
//! Wires storage, the ratio table and the services together so a request
//! handler only needs one value.
//!
//! # Example
//!
//! ```ignore
//! use loyalty_ledger::config::Config;
//! use loyalty_ledger::facade::LoyaltyLedger;
//! use loyalty_ledger::services::ConsumeRequest;
//!
//! let ledger = LoyaltyLedger::open(&Config::load(None)?).await?;
//!
//! let outcome = ledger
//!     .engine()
//!     .consume(ConsumeRequest::new(&member_id, 1000, true, "O1"))
//!     .await?;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, LedgerConfig};
use crate::error::Result;
use crate::model::RatioSnapshot;
use crate::services::{MemberDirectory, RatioTable, ReferralGraph, TransactionEngine};
use crate::storage::{init_storage, Stores};

/// A fully wired ledger.
pub struct LoyaltyLedger {
    stores: Stores,
    ratios: Arc<RatioTable>,
    directory: MemberDirectory,
    referrals: ReferralGraph,
    engine: TransactionEngine,
}

impl LoyaltyLedger {
    /// Open the configured storage and load the ratio table.
    pub async fn open(config: &Config) -> Result<Self> {
        let stores = init_storage(&config.storage).await?;
        Self::with_stores(stores, config.ledger.clone()).await
    }

    /// In-memory ledger with default settings.
    pub async fn in_memory() -> Result<Self> {
        Self::open(&Config::for_test()).await
    }

    /// Build on already-initialized stores.
    pub async fn with_stores(stores: Stores, settings: LedgerConfig) -> Result<Self> {
        let ratios = Arc::new(RatioTable::load(stores.ratios.clone(), &settings.default_ratios).await?);
        let snapshot = ratios.current().await;
        info!(
            version = snapshot.version,
            tiers = snapshot.tiers.len(),
            "Ledger ready"
        );

        Ok(Self {
            directory: MemberDirectory::new(stores.members.clone(), ratios.clone()),
            referrals: ReferralGraph::new(stores.members.clone(), ratios.clone()),
            engine: TransactionEngine::new(
                stores.members.clone(),
                stores.ledger.clone(),
                ratios.clone(),
                settings,
            ),
            ratios,
            stores,
        })
    }

    pub fn directory(&self) -> &MemberDirectory {
        &self.directory
    }

    pub fn referrals(&self) -> &ReferralGraph {
        &self.referrals
    }

    pub fn ratios(&self) -> &RatioTable {
        &self.ratios
    }

    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Current ratio snapshot.
    pub async fn current_ratios(&self) -> Arc<RatioSnapshot> {
        self.ratios.current().await
    }
}
