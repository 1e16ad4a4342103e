//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{LedgerStore, MemberStore, RatioStore, StorageError};

pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// The three storage collaborators, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub members: Arc<dyn MemberStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub ratios: Arc<dyn RatioStore>,
}

impl Stores {
    /// Share one backend across all three roles.
    ///
    /// Postings that touch balances and records rely on the ledger and member
    /// roles living in the same backend.
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: MemberStore + LedgerStore + RatioStore + 'static,
    {
        Self {
            members: store.clone(),
            ledger: store.clone(),
            ratios: store,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores, StorageError> {
    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.path, "Storage: sqlite");
            let store = SqliteStore::connect(&config.path).await?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unsupported("sqlite".into()))
        }
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Stores::from_backend(Arc::new(MockStore::new())))
        }
    }
}
