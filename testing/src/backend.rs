//! In-memory store backend with fault injection.
//!
//! [`InMemoryBackend`] implements every store trait of `plotbook-core` over a
//! single mutex-guarded state, so conditional writes are atomic exactly like
//! the database's `UPDATE ... WHERE` statements. Faults can be injected to
//! exercise compensation and timeout paths:
//!
//! - [`InMemoryBackend::fail_next_booking_inserts`]
//! - [`InMemoryBackend::fail_next_compensations`]
//! - [`InMemoryBackend::delay_booking_inserts`]
//! - [`InMemoryBackend::delay_reads`]

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only poisoned locks panic

use crate::feed::InMemoryMessageFeed;
use plotbook_core::store::{
    BookingStore, Conditional, FavoritesStore, ListingStore, MessageStore, StoreError, StoreFuture,
};
use plotbook_core::types::{
    Block, BlockRowId, Booking, BookingId, BookingStatus, Message, Property, PropertyId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct State {
    properties: HashMap<PropertyId, Property>,
    blocks: HashMap<BlockRowId, Block>,
    bookings: HashMap<BookingId, Booking>,
    messages: Vec<Message>,
    saved: HashMap<UserId, Vec<PropertyId>>,
}

#[derive(Default)]
struct Faults {
    failing_booking_inserts: usize,
    failing_compensations: usize,
    booking_insert_delay: Option<Duration>,
    inventory_write_delay: Option<Duration>,
    read_delay: Option<Duration>,
}

/// In-memory implementation of every store trait.
///
/// Cloning shares the underlying state.
///
/// # Example
///
/// ```
/// use plotbook_testing::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// backend.fail_next_booking_inserts(1);
/// assert_eq!(backend.total_calls(), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    feed: InMemoryMessageFeed,
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            faults: Arc::new(Mutex::new(Faults::default())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            feed: InMemoryMessageFeed::new(),
        }
    }

    /// Realtime feed that receives every inserted message.
    #[must_use]
    pub fn feed(&self) -> InMemoryMessageFeed {
        self.feed.clone()
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make the next `n` booking inserts fail with a database error.
    pub fn fail_next_booking_inserts(&self, n: usize) {
        self.faults.lock().unwrap().failing_booking_inserts = n;
    }

    /// Make the next `n` compensating writes (plot increments and property
    /// releases) fail with an unavailable error.
    pub fn fail_next_compensations(&self, n: usize) {
        self.faults.lock().unwrap().failing_compensations = n;
    }

    /// Delay every booking insert; the row is written only after the delay.
    pub fn delay_booking_inserts(&self, delay: Duration) {
        self.faults.lock().unwrap().booking_insert_delay = Some(delay);
    }

    /// Delay the acknowledgement of plot decrements and property claims.
    /// The write is applied immediately, so a caller that gives up early
    /// leaves it in place.
    pub fn delay_inventory_writes(&self, delay: Duration) {
        self.faults.lock().unwrap().inventory_write_delay = Some(delay);
    }

    /// Delay every property and block read. The row is read when the call is
    /// made and returned after the delay, like a slow network round trip.
    pub fn delay_reads(&self, delay: Duration) {
        self.faults.lock().unwrap().read_delay = Some(delay);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    // ------------------------------------------------------------------
    // Inspection and seeding
    // ------------------------------------------------------------------

    /// Number of calls made to one store operation.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Number of store calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Store a property directly, bypassing validation.
    pub fn seed_property(&self, property: Property) {
        self.state.lock().unwrap().properties.insert(property.id.clone(), property);
    }

    /// Store blocks directly, bypassing validation.
    pub fn seed_blocks(&self, blocks: impl IntoIterator<Item = Block>) {
        let mut state = self.state.lock().unwrap();
        for block in blocks {
            state.blocks.insert(block.id, block);
        }
    }

    /// Store a booking directly.
    pub fn seed_booking(&self, booking: Booking) {
        self.state.lock().unwrap().bookings.insert(booking.id, booking);
    }

    /// Store a message directly, without publishing it.
    pub fn seed_message(&self, message: Message) {
        self.state.lock().unwrap().messages.push(message);
    }

    /// Current state of a property.
    #[must_use]
    pub fn property(&self, id: &PropertyId) -> Option<Property> {
        self.state.lock().unwrap().properties.get(id).cloned()
    }

    /// Current state of a block.
    #[must_use]
    pub fn block(&self, id: &BlockRowId) -> Option<Block> {
        self.state.lock().unwrap().blocks.get(id).cloned()
    }

    /// Current state of a booking.
    #[must_use]
    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.state.lock().unwrap().bookings.get(id).cloned()
    }

    /// Every stored booking.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.state.lock().unwrap().bookings.values().cloned().collect()
    }

    /// Every stored message, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    fn record(&self, operation: &'static str) {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
    }

    fn read_delay(&self) -> Option<Duration> {
        self.faults.lock().unwrap().read_delay
    }

    fn take_compensation_fault(&self) -> bool {
        let mut faults = self.faults.lock().unwrap();
        if faults.failing_compensations > 0 {
            faults.failing_compensations -= 1;
            return true;
        }
        false
    }

    /// Resolve an inventory write already applied after the configured delay.
    fn acknowledged<T: Send + 'static>(&self, outcome: Conditional<T>) -> StoreFuture<'_, Conditional<T>> {
        let delay = self.faults.lock().unwrap().inventory_write_delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(outcome)
        })
    }

    /// Resolve a read taken now after the configured delay.
    fn delayed<T: Send + 'static>(&self, value: Result<T, StoreError>) -> StoreFuture<'_, T> {
        let delay = self.read_delay();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            value
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(properties: &mut [Property]) {
    properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl ListingStore for InMemoryBackend {
    fn fetch_property(&self, id: &PropertyId) -> StoreFuture<'_, Option<Property>> {
        self.record("fetch_property");
        let property = self.state.lock().unwrap().properties.get(id).cloned();
        self.delayed(Ok(property))
    }

    fn list_properties(&self) -> StoreFuture<'_, Vec<Property>> {
        self.record("list_properties");
        let mut properties: Vec<Property> = self.state.lock().unwrap().properties.values().cloned().collect();
        newest_first(&mut properties);
        self.delayed(Ok(properties))
    }

    fn properties_by_owner(&self, owner: &UserId) -> StoreFuture<'_, Vec<Property>> {
        self.record("properties_by_owner");
        let mut properties: Vec<Property> = self
            .state
            .lock()
            .unwrap()
            .properties
            .values()
            .filter(|p| p.owner_id == *owner)
            .cloned()
            .collect();
        newest_first(&mut properties);
        self.delayed(Ok(properties))
    }

    fn insert_property(&self, property: Property) -> StoreFuture<'_, Property> {
        self.record("insert_property");
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.properties.contains_key(&property.id) {
                return Err(StoreError::Duplicate(format!("property {}", property.id)));
            }
            state.properties.insert(property.id.clone(), property.clone());
            Ok(property)
        })
    }

    fn update_property(&self, property: Property) -> StoreFuture<'_, Property> {
        self.record("update_property");
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            match state.properties.get_mut(&property.id) {
                Some(stored) => {
                    *stored = Property {
                        owner_id: stored.owner_id,
                        is_available: stored.is_available,
                        created_at: stored.created_at,
                        ..property
                    };
                    Ok(stored.clone())
                },
                None => Err(StoreError::NotFound(format!("property {}", property.id))),
            }
        })
    }

    fn delete_property(&self, id: &PropertyId) -> StoreFuture<'_, ()> {
        self.record("delete_property");
        let id = id.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.properties.remove(&id).is_none() {
                return Err(StoreError::NotFound(format!("property {id}")));
            }
            state.blocks.retain(|_, block| block.property_id != id);
            Ok(())
        })
    }

    fn fetch_blocks(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Block>> {
        self.record("fetch_blocks");
        let mut blocks: Vec<Block> = self
            .state
            .lock()
            .unwrap()
            .blocks
            .values()
            .filter(|b| b.property_id == *property_id)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        self.delayed(Ok(blocks))
    }

    fn fetch_block(&self, id: &BlockRowId) -> StoreFuture<'_, Option<Block>> {
        self.record("fetch_block");
        let block = self.state.lock().unwrap().blocks.get(id).cloned();
        self.delayed(Ok(block))
    }

    fn insert_blocks(&self, blocks: Vec<Block>) -> StoreFuture<'_, Vec<Block>> {
        self.record("insert_blocks");
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            for block in &blocks {
                if !state.properties.contains_key(&block.property_id) {
                    return Err(StoreError::NotFound(format!("property {}", block.property_id)));
                }
                let taken = state
                    .blocks
                    .values()
                    .any(|b| b.property_id == block.property_id && b.block_id == block.block_id);
                if taken {
                    return Err(StoreError::Duplicate(format!("block {}", block.block_id)));
                }
            }
            for block in &blocks {
                state.blocks.insert(block.id, block.clone());
            }
            Ok(blocks)
        })
    }

    fn decrement_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>> {
        self.record("decrement_available_plots");
        let outcome = match self.state.lock().unwrap().blocks.get_mut(id) {
            None => Conditional::Missing,
            Some(block) if block.available_plots == 0 => Conditional::PreconditionFailed,
            Some(block) => {
                block.available_plots -= 1;
                Conditional::Applied(block.clone())
            },
        };
        self.acknowledged(outcome)
    }

    fn increment_available_plots(&self, id: &BlockRowId) -> StoreFuture<'_, Conditional<Block>> {
        self.record("increment_available_plots");
        let id = *id;
        Box::pin(async move {
            if self.take_compensation_fault() {
                return Err(StoreError::Unavailable("injected compensation failure".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            Ok(match state.blocks.get_mut(&id) {
                None => Conditional::Missing,
                Some(block) if block.available_plots >= block.total_plots => Conditional::PreconditionFailed,
                Some(block) => {
                    block.available_plots += 1;
                    Conditional::Applied(block.clone())
                },
            })
        })
    }

    fn claim_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>> {
        self.record("claim_property");
        let outcome = match self.state.lock().unwrap().properties.get_mut(id) {
            None => Conditional::Missing,
            Some(property) if !property.is_available => Conditional::PreconditionFailed,
            Some(property) => {
                property.is_available = false;
                Conditional::Applied(property.clone())
            },
        };
        self.acknowledged(outcome)
    }

    fn release_property(&self, id: &PropertyId) -> StoreFuture<'_, Conditional<Property>> {
        self.record("release_property");
        let id = id.clone();
        Box::pin(async move {
            if self.take_compensation_fault() {
                return Err(StoreError::Unavailable("injected compensation failure".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            Ok(match state.properties.get_mut(&id) {
                None => Conditional::Missing,
                Some(property) if property.is_available => Conditional::PreconditionFailed,
                Some(property) => {
                    property.is_available = true;
                    Conditional::Applied(property.clone())
                },
            })
        })
    }
}

impl BookingStore for InMemoryBackend {
    fn insert_booking(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        self.record("insert_booking");
        Box::pin(async move {
            let delay = {
                let mut faults = self.faults.lock().unwrap();
                if faults.failing_booking_inserts > 0 {
                    faults.failing_booking_inserts -= 1;
                    return Err(StoreError::Database("injected booking insert failure".to_string()));
                }
                faults.booking_insert_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock().unwrap();
            if state.bookings.contains_key(&booking.id) {
                return Err(StoreError::Duplicate(format!("booking {}", booking.id)));
            }
            state.bookings.insert(booking.id, booking.clone());
            Ok(booking)
        })
    }

    fn fetch_booking(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>> {
        self.record("fetch_booking");
        let booking = self.state.lock().unwrap().bookings.get(id).cloned();
        Box::pin(async move { Ok(booking) })
    }

    fn bookings_for_property(&self, property_id: &PropertyId) -> StoreFuture<'_, Vec<Booking>> {
        self.record("bookings_for_property");
        let mut bookings: Vec<Booking> = self
            .state
            .lock()
            .unwrap()
            .bookings
            .values()
            .filter(|b| b.property_id == *property_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Box::pin(async move { Ok(bookings) })
    }

    fn bookings_for_buyer(&self, buyer: &UserId) -> StoreFuture<'_, Vec<Booking>> {
        self.record("bookings_for_buyer");
        let mut bookings: Vec<Booking> = self
            .state
            .lock()
            .unwrap()
            .bookings
            .values()
            .filter(|b| b.buyer.user_id.as_ref() == Some(buyer))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Box::pin(async move { Ok(bookings) })
    }

    fn update_booking_status(
        &self,
        id: &BookingId,
        expected: BookingStatus,
        status: BookingStatus,
    ) -> StoreFuture<'_, Conditional<Booking>> {
        self.record("update_booking_status");
        let id = *id;
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            Ok(match state.bookings.get_mut(&id) {
                None => Conditional::Missing,
                Some(booking) if booking.status != expected => Conditional::PreconditionFailed,
                Some(booking) => {
                    booking.status = status;
                    Conditional::Applied(booking.clone())
                },
            })
        })
    }
}

impl MessageStore for InMemoryBackend {
    fn insert_message(&self, message: Message) -> StoreFuture<'_, Message> {
        self.record("insert_message");
        Box::pin(async move {
            self.state.lock().unwrap().messages.push(message.clone());
            self.feed.publish(message.clone());
            Ok(message)
        })
    }

    fn messages_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Message>> {
        self.record("messages_for_user");
        let mut messages: Vec<Message> = self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.sender_id == *user || m.receiver_id == *user)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Box::pin(async move { Ok(messages) })
    }
}

impl FavoritesStore for InMemoryBackend {
    fn save_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()> {
        self.record("save_property");
        let (user, property_id) = (*user, property_id.clone());
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let saved = state.saved.entry(user).or_default();
            if !saved.contains(&property_id) {
                saved.insert(0, property_id);
            }
            Ok(())
        })
    }

    fn unsave_property(&self, user: &UserId, property_id: &PropertyId) -> StoreFuture<'_, ()> {
        self.record("unsave_property");
        let (user, property_id) = (*user, property_id.clone());
        Box::pin(async move {
            if let Some(saved) = self.state.lock().unwrap().saved.get_mut(&user) {
                saved.retain(|id| *id != property_id);
            }
            Ok(())
        })
    }

    fn saved_property_ids(&self, user: &UserId) -> StoreFuture<'_, Vec<PropertyId>> {
        self.record("saved_property_ids");
        let saved = self.state.lock().unwrap().saved.get(user).cloned().unwrap_or_default();
        Box::pin(async move { Ok(saved) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn conditional_decrement_stops_at_zero() {
        let backend = InMemoryBackend::new();
        let owner = UserId::new();
        let property = fixtures::property(owner, "PROP-TN-20250101001");
        let block = fixtures::block(&property.id, "A", 1);
        backend.seed_property(property);
        backend.seed_blocks([block.clone()]);

        let first = backend.decrement_available_plots(&block.id).await.unwrap();
        assert_eq!(first.applied().map(|b| b.available_plots), Some(0));
        let second = backend.decrement_available_plots(&block.id).await.unwrap();
        assert_eq!(second, Conditional::PreconditionFailed);
        let missing = backend.decrement_available_plots(&BlockRowId::new()).await.unwrap();
        assert_eq!(missing, Conditional::Missing);
        assert_eq!(backend.call_count("decrement_available_plots"), 3);
    }

    #[tokio::test]
    async fn increment_never_exceeds_total() {
        let backend = InMemoryBackend::new();
        let property = fixtures::property(UserId::new(), "PROP-TN-20250101002");
        let block = fixtures::block(&property.id, "A", 2);
        backend.seed_property(property);
        backend.seed_blocks([block.clone()]);

        let outcome = backend.increment_available_plots(&block.id).await.unwrap();
        assert_eq!(outcome, Conditional::PreconditionFailed);
    }

    #[tokio::test]
    async fn injected_insert_failure_is_consumed() {
        let backend = InMemoryBackend::new();
        backend.fail_next_booking_inserts(1);
        let booking = fixtures::booking(&PropertyId::new("PROP-TN-1"), None);

        assert!(backend.insert_booking(booking.clone()).await.is_err());
        assert!(backend.insert_booking(booking).await.is_ok());
        assert_eq!(backend.bookings().len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_blocks() {
        let backend = InMemoryBackend::new();
        let property = fixtures::property(UserId::new(), "PROP-TN-20250101003");
        let block = fixtures::block(&property.id, "A", 5);
        backend.seed_property(property.clone());
        backend.seed_blocks([block.clone()]);

        backend.delete_property(&property.id).await.unwrap();
        assert!(backend.block(&block.id).is_none());
        assert!(matches!(backend.delete_property(&property.id).await, Err(StoreError::NotFound(_))));
    }
}
