//! Owner-driven booking status transitions.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use plotbook_core::booking::{BookingCommitter, BookingError};
use plotbook_core::config::BookingConfig;
use plotbook_core::error::Recovery;
use plotbook_core::types::{Block, Booking, BookingId, BookingStatus, Property, PropertyId, UserId};
use plotbook_testing::{InMemoryBackend, booking_environment, fixtures};
use std::sync::Arc;

struct Fixture {
    backend: Arc<InMemoryBackend>,
    owner: UserId,
    property: Property,
    block: Block,
    booking: Booking,
}

/// A pending plot booking on a block with one plot already taken.
fn setup() -> Fixture {
    let backend = Arc::new(InMemoryBackend::new());
    let owner = UserId::new();
    let property = fixtures::property(owner, "PROP-TN-20250101001");
    let mut block = fixtures::block(&property.id, "A", 5);
    block.available_plots = 4;
    let booking = fixtures::booking(&property.id, Some(block.id));
    backend.seed_property(property.clone());
    backend.seed_blocks([block.clone()]);
    backend.seed_booking(booking.clone());
    Fixture { backend, owner, property, block, booking }
}

fn committer(f: &Fixture, restock_on_cancel: bool) -> BookingCommitter {
    BookingCommitter::new(booking_environment(
        &f.backend,
        BookingConfig { restock_on_cancel, ..BookingConfig::default() },
    ))
}

#[tokio::test]
async fn test_owner_confirms_pending_booking() {
    let f = setup();

    let change = committer(&f, false)
        .transition_status(&f.owner, &f.booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();

    assert_eq!(change.booking.status, BookingStatus::Confirmed);
    assert!(!change.restocked);
    assert_eq!(f.backend.booking(&f.booking.id).unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_non_owner_cannot_confirm() {
    let f = setup();
    let stranger = UserId::new();

    let err = committer(&f, false)
        .transition_status(&stranger, &f.booking.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();

    assert_eq!(err, BookingError::Unauthorized);
    assert_eq!(err.recovery(), Recovery::None);
    assert_eq!(f.backend.booking(&f.booking.id).unwrap().status, BookingStatus::Pending);
    assert_eq!(f.backend.call_count("update_booking_status"), 0);
}

#[tokio::test]
async fn test_only_pending_bookings_move() {
    let f = setup();
    let committer = committer(&f, false);
    committer.transition_status(&f.owner, &f.booking.id, BookingStatus::Cancelled).await.unwrap();

    let err = committer
        .transition_status(&f.owner, &f.booking.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::InvalidTransition { from: BookingStatus::Cancelled, to: BookingStatus::Confirmed }
    );

    let back = committer.transition_status(&f.owner, &f.booking.id, BookingStatus::Pending).await;
    assert!(matches!(back, Err(BookingError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_cancel_keeps_inventory_by_default() {
    let f = setup();

    let change = committer(&f, false)
        .transition_status(&f.owner, &f.booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();

    assert!(!change.restocked);
    assert_eq!(f.backend.block(&f.block.id).unwrap().available_plots, 4);
}

#[tokio::test]
async fn test_cancel_restocks_when_enabled() {
    let f = setup();

    let change = committer(&f, true)
        .transition_status(&f.owner, &f.booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();

    assert!(change.restocked);
    assert_eq!(f.backend.block(&f.block.id).unwrap().available_plots, 5);
}

#[tokio::test]
async fn test_cancelling_whole_property_booking_reopens_it_when_enabled() {
    let f = setup();
    let mut sold = f.property.clone();
    sold.id = PropertyId::new("PROP-TN-20250101002");
    sold.is_available = false;
    let booking = fixtures::booking(&sold.id, None);
    f.backend.seed_property(sold.clone());
    f.backend.seed_booking(booking.clone());

    let change = committer(&f, true)
        .transition_status(&f.owner, &booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();

    assert!(change.restocked);
    assert!(f.backend.property(&sold.id).unwrap().is_available);
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let f = setup();
    let err = committer(&f, false)
        .transition_status(&f.owner, &BookingId::new(), BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));
}
