//! Wiring of the store, feed and object storage implementations.

use plotbook_core::config::Config;
use plotbook_core::realtime::MessageFeed;
use plotbook_core::storage::ObjectStorage;
use plotbook_core::store::{BookingStore, FavoritesStore, ListingStore, MessageStore};
use plotbook_postgres::{PgMessageFeed, PostgresStore};
use plotbook_storage::HttpObjectStorage;
use plotbook_testing::{InMemoryBackend, InMemoryObjectStorage};
use std::sync::Arc;
use tracing::info;

/// Selects the store implementation (`postgres` or `memory`).
pub const BACKEND_VAR: &str = "PLOTBOOK_BACKEND";

/// Every external dependency of the services.
pub struct Backends {
    pub listings: Arc<dyn ListingStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub messages: Arc<dyn MessageStore>,
    pub favorites: Arc<dyn FavoritesStore>,
    pub feed: Arc<dyn MessageFeed>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backends {
    /// Connect the backends selected by the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or migrated.
    pub async fn from_env(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let storage: Arc<dyn ObjectStorage> = match HttpObjectStorage::from_config(&config.storage) {
            Some(storage) => {
                info!("Using HTTP object storage");
                Arc::new(storage)
            },
            None => {
                info!("STORAGE_URL not set; using in-memory object storage");
                Arc::new(InMemoryObjectStorage::new())
            },
        };

        let backend = std::env::var(BACKEND_VAR).unwrap_or_default();
        if backend.eq_ignore_ascii_case("postgres") {
            info!("Connecting to PostgreSQL...");
            let store = Arc::new(PostgresStore::connect(&config.database).await?);
            store.migrate().await?;
            info!("Database migrated");
            let feed = Arc::new(PgMessageFeed::new(store.pool().clone()));
            Ok(Self {
                listings: store.clone(),
                bookings: store.clone(),
                messages: store.clone(),
                favorites: store,
                feed,
                storage,
            })
        } else {
            info!("Using in-memory store (set {BACKEND_VAR}=postgres for PostgreSQL)");
            let store = Arc::new(InMemoryBackend::new());
            let feed = Arc::new(store.feed());
            Ok(Self {
                listings: store.clone(),
                bookings: store.clone(),
                messages: store.clone(),
                favorites: store,
                feed,
                storage,
            })
        }
    }
}
