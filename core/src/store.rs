//! Store traits for the persistent backend.
//!
//! The backend holds properties, blocks, bookings, messages and saved
//! properties. This module defines the typed, dyn-compatible traits the
//! services of this crate consume; the backend itself is external.
//!
//! # Conditional writes
//!
//! The only shared mutable resources of the booking flow are a block's
//! `available_plots` counter and a property's `is_available` flag. Every write
//! to them is conditional: the store applies it only if its precondition still
//! holds at write time and reports a [`Conditional`] outcome. No caller ever
//! holds a lock across several store calls.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `plotbook-postgres`): production implementation
//! - `InMemoryBackend` (in `plotbook-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! traits can be held as `Arc<dyn ListingStore>` and friends.

use crate::types::{
    Block, BlockRowId, Booking, BookingId, BookingStatus, Message, Property, PropertyId, UserId,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be mapped onto the domain types.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the call (permissions, injected faults, shutdown).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional<T> {
    /// The precondition held and the write was applied; carries the updated row.
    Applied(T),
    /// The row exists but the precondition no longer held; nothing was written.
    PreconditionFailed,
    /// The row does not exist.
    Missing,
}

impl<T> Conditional<T> {
    /// Whether the write was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The updated row, if the write was applied.
    #[must_use]
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::PreconditionFailed | Self::Missing => None,
        }
    }
}

/// Properties and their blocks.
pub trait ListingStore: Send + Sync {
    /// Fetch one property by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn fetch_property(&self, id: &PropertyId) -> StoreFuture<'_, Option<Property>>;

    /// Fetch every property.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn list_properties(&self) -> StoreFuture<'_, Vec<Property>>;

    /// Fetch the properties of one owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn properties_by_owner(&self, owner: &UserId) -> StoreFuture<'_, Vec<Property>>;

    /// Insert a new property.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn insert_property(&self, property: Property) -> StoreFuture<'_, Property>;

    /// Replace a property's editable fields.
    ///
    /// `owner_id`, `created_at` and `is_available` keep their stored values;
    /// availability only changes through [`ListingStore::claim_property`] and
    /// [`ListingStore::release_property`]. Returns the row as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the property does not exist.
    fn update_property(&self, property: Property) -> StoreFuture<'_, Property>;

    /// Delete a property together with its blocks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the property does not exist.
    fn delete_property(&self, id: &PropertyId) -> StoreFuture<'_, ()>;

    /// Fetch the blocks of a property ordered by block label.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn fetch_blocks(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Block>>;

    /// Fetch one block by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn fetch_block(&self, id: &BlockRowId) -> StoreFuture<'_, Option<Block>>;

    /// Insert blocks for an existing property.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if a label is already used in the
    /// property, [`StoreError::NotFound`] if the property does not exist.
    fn insert_blocks(&self, blocks: Vec<Block>) -> StoreFuture<'_, Vec<Block>>;

    /// Decrement `available_plots` by one iff it is greater than zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn decrement_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>>;

    /// Increment `available_plots` by one iff it is below `total_plots`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn increment_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>>;

    /// Set `is_available` to false iff it is currently true.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn claim_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>>;

    /// Set `is_available` to true iff it is currently false.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn release_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>>;
}

/// Booking records.
pub trait BookingStore: Send + Sync {
    /// Insert a booking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn insert_booking(&self, booking: Booking) -> StoreFuture<'_, Booking>;

    /// Fetch one booking by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn fetch_booking(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// Bookings of a property, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn bookings_for_property(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Booking>>;

    /// Bookings made by an authenticated buyer, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn bookings_for_buyer(&self, buyer: &UserId) -> StoreFuture<'_, Vec<Booking>>;

    /// Set a booking's status iff its current status equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> StoreFuture<'_, Conditional<Booking>>;
}

/// Message rows.
pub trait MessageStore: Send + Sync {
    /// Insert a message (and notify realtime subscribers, where supported).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn insert_message(&self, message: Message) -> StoreFuture<'_, Message>;

    /// Every message sent or received by `user`, `created_at` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn messages_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Message>>;
}

/// Saved ("favourite") properties per user.
pub trait FavoritesStore: Send + Sync {
    /// Mark a property as saved; saving twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn save_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()>;

    /// Remove a saved mark; removing an absent mark is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn unsave_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()>;

    /// Ids of the properties `user` saved, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend call fails.
    fn saved_property_ids(&self, user: &UserId) -> StoreFuture<'_, Vec<PropertyId>>;
}

/// A store call that failed or did not finish in time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The call did not complete within the configured limit.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// Name of the store operation
        operation: &'static str,
        /// The limit that was exceeded
        limit: Duration,
    },
}

/// Run one store call with an upper bound on its duration.
///
/// # Errors
///
/// Returns [`CallError::Timeout`] if `limit` elapses first, otherwise the
/// store's own error.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(CallError::Store),
        Err(_) => Err(CallError::Timeout { operation, limit }),
    }
}
