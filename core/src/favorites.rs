//! Saved properties.

use crate::config::BookingConfig;
use crate::store::{CallError, FavoritesStore, ListingStore, StoreError, bounded};
use crate::types::{Property, PropertyId, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`FavoritesService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FavoritesError {
    /// The property does not exist.
    #[error("property not found: {0}")]
    NotFound(PropertyId),

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A store call did not finish in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Name of the store operation
        operation: &'static str,
        /// The limit that was exceeded
        limit: Duration,
    },
}

impl From<CallError> for FavoritesError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(store) => Self::Store(store),
            CallError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

/// Per-user saved listings.
#[derive(Clone)]
pub struct FavoritesService {
    favorites: Arc<dyn FavoritesStore>,
    listings: Arc<dyn ListingStore>,
    config: BookingConfig,
}

impl FavoritesService {
    /// Creates a new `FavoritesService`
    #[must_use]
    pub fn new(favorites: Arc<dyn FavoritesStore>, listings: Arc<dyn ListingStore>, config: BookingConfig) -> Self {
        Self { favorites, listings, config }
    }

    /// Flip the saved mark of a property and return the new state.
    ///
    /// # Errors
    ///
    /// - [`FavoritesError::NotFound`] if the property does not exist
    /// - [`FavoritesError::Store`] / [`FavoritesError::Timeout`] on store failure
    pub async fn toggle_saved(&self, user: &UserId, property_id: &PropertyId) -> Result<bool, FavoritesError> {
        let limit = self.config.request_timeout;
        if bounded(limit, "fetch_property", self.listings.fetch_property(property_id)).await?.is_none() {
            return Err(FavoritesError::NotFound(property_id.clone()));
        }
        let saved = bounded(limit, "saved_property_ids", self.favorites.saved_property_ids(user)).await?;
        if saved.contains(property_id) {
            bounded(limit, "unsave_property", self.favorites.unsave_property(user, property_id)).await?;
            tracing::debug!(%user, %property_id, "Property unsaved");
            Ok(false)
        } else {
            bounded(limit, "save_property", self.favorites.save_property(user, property_id)).await?;
            tracing::debug!(%user, %property_id, "Property saved");
            Ok(true)
        }
    }

    /// The saved properties that still exist, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns [`FavoritesError::Store`] / [`FavoritesError::Timeout`] on store failure.
    pub async fn saved_properties(&self, user: &UserId) -> Result<Vec<Property>, FavoritesError> {
        let limit = self.config.request_timeout;
        let ids = bounded(limit, "saved_property_ids", self.favorites.saved_property_ids(user)).await?;
        let mut properties = Vec::with_capacity(ids.len());
        for id in &ids {
            match bounded(limit, "fetch_property", self.listings.fetch_property(id)).await? {
                Some(property) => properties.push(property),
                None => tracing::debug!(property_id = %id, "Saved property no longer listed"),
            }
        }
        Ok(properties)
    }
}
