//! Process-wide commission ratio table.
//!
//! Readers take a cheap `Arc` clone of the current snapshot and use it for
//! the whole operation, so an update never changes ratios mid-Consume.
//! Updates are serialized, persisted first and only then published.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::Result;
use crate::interfaces::RatioStore;
use crate::model::{
    parse_fractions, tiers_from_fractions, validate_tiers, RatioSnapshot, RatioSync, RatioTier,
};

/// Versioned ratio table backed by a [`RatioStore`].
pub struct RatioTable {
    store: Arc<dyn RatioStore>,
    current: RwLock<Arc<RatioSnapshot>>,
    update_lock: Mutex<()>,
}

impl RatioTable {
    /// Read the persisted table, seeding it with `defaults` on first start.
    pub async fn load(store: Arc<dyn RatioStore>, defaults: &[Decimal]) -> Result<Self> {
        let mut tiers = store.load_tiers().await?;
        if tiers.is_empty() {
            tiers = tiers_from_fractions(defaults);
            validate_tiers(&tiers)?;
            store.replace_tiers(&tiers, &[]).await?;
            info!(tiers = tiers.len(), "Seeded ratio table with defaults");
        } else {
            validate_tiers(&tiers)?;
        }

        Ok(Self {
            store,
            current: RwLock::new(Arc::new(RatioSnapshot { version: 1, tiers })),
            update_lock: Mutex::new(()),
        })
    }

    /// The snapshot in effect right now.
    pub async fn current(&self) -> Arc<RatioSnapshot> {
        self.current.read().await.clone()
    }

    /// Run `work` against the current snapshot with updates held off.
    ///
    /// Callers that record a ratio from the snapshot use this so a
    /// concurrent [`RatioTable::update`] either sees their write in its
    /// sync or publishes before they read.
    pub async fn hold_current<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce(Arc<RatioSnapshot>) -> Fut,
        Fut: Future<Output = T>,
    {
        let _update = self.update_lock.lock().await;
        let snapshot = self.current().await;
        work(snapshot).await
    }

    /// Replace the whole table.
    ///
    /// With `sync_existing` and `update_all`, every link under every tier of
    /// the new table is rewritten to the new fraction. With `sync_existing`
    /// alone, only tiers whose fraction changed are synced and only links
    /// still carrying the previous fraction move. Without it, existing
    /// links keep their recorded ratio.
    pub async fn update(
        &self,
        tiers: Vec<RatioTier>,
        sync_existing: bool,
        update_all: bool,
    ) -> Result<Arc<RatioSnapshot>> {
        validate_tiers(&tiers)?;

        let _update = self.update_lock.lock().await;
        let previous = self.current().await;

        let syncs = plan_syncs(&previous, &tiers, sync_existing, update_all);

        let rewritten = self.store.replace_tiers(&tiers, &syncs).await?;

        let snapshot = Arc::new(RatioSnapshot {
            version: previous.version + 1,
            tiers,
        });
        *self.current.write().await = snapshot.clone();

        info!(
            version = snapshot.version,
            synced_tiers = syncs.len(),
            rewritten_links = rewritten,
            "Ratio table updated"
        );
        Ok(snapshot)
    }

    /// [`RatioTable::update`] from textual fractions, position as key.
    pub async fn update_from_strings<S: AsRef<str>>(
        &self,
        fractions: &[S],
        sync_existing: bool,
        update_all: bool,
    ) -> Result<Arc<RatioSnapshot>> {
        let tiers = parse_fractions(fractions)?;
        self.update(tiers, sync_existing, update_all).await
    }
}

fn plan_syncs(
    previous: &RatioSnapshot,
    tiers: &[RatioTier],
    sync_existing: bool,
    update_all: bool,
) -> Vec<RatioSync> {
    if !sync_existing {
        return Vec::new();
    }
    tiers
        .iter()
        .filter_map(|tier| {
            let from = previous.fraction(tier.key);
            if update_all {
                return Some(RatioSync {
                    tier: tier.key,
                    from: from.unwrap_or(tier.fraction),
                    to: tier.fraction,
                    update_all,
                });
            }
            let from = from?;
            (from != tier.fraction).then_some(RatioSync {
                tier: tier.key,
                from,
                to: tier.fraction,
                update_all,
            })
        })
        .collect()
}
