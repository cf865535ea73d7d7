//! Booking Committer integration tests against the in-memory backend.
//!
//! Covers the attempt state machine, the conditional inventory write, the
//! compensating action and the per-call timeouts.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use plotbook_core::availability::{IneligibleReason, UnitSelection};
use plotbook_core::booking::{AttemptState, BookingCommitter, BookingError, BookingRequest, RequiredField};
use plotbook_core::config::BookingConfig;
use plotbook_core::environment::Clock;
use plotbook_core::error::Recovery;
use plotbook_core::inventory::PlotSlot;
use plotbook_core::types::{Block, BookingStatus, BuyerContact, Property, PropertyId, UserId};
use plotbook_testing::{InMemoryBackend, booking_environment, fixtures, init_test_tracing, test_clock};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    backend: Arc<InMemoryBackend>,
    committer: BookingCommitter,
    property: Property,
    block: Block,
}

fn setup_with(config: BookingConfig, plots: u32) -> Fixture {
    init_test_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let property = fixtures::property(UserId::new(), "PROP-TN-20250101001");
    let block = fixtures::block(&property.id, "A", plots);
    backend.seed_property(property.clone());
    backend.seed_blocks([block.clone()]);
    let committer = BookingCommitter::new(booking_environment(&backend, config));
    Fixture { backend, committer, property, block }
}

fn setup(plots: u32) -> Fixture {
    setup_with(BookingConfig::default(), plots)
}

fn plot_request(fixture: &Fixture, slot: u32) -> BookingRequest {
    BookingRequest {
        selection: UnitSelection::Plot {
            property_id: fixture.property.id.clone(),
            block: fixture.block.id,
            slot: PlotSlot::new(slot),
        },
        buyer: fixtures::buyer(),
        notes: Some("Prefer a corner plot".to_string()),
    }
}

fn available(fixture: &Fixture) -> u32 {
    fixture.backend.block(&fixture.block.id).unwrap().available_plots
}

#[tokio::test]
async fn test_commits_plot_booking_with_price_snapshot() {
    let f = setup(10);

    let booking = f.committer.book(plot_request(&f, 3)).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.block_id, Some(f.block.id));
    assert_eq!(booking.total_price, Decimal::from(3_000_000));
    assert_eq!(booking.created_at, test_clock().now());
    assert_eq!(available(&f), 9);
    assert_eq!(f.backend.booking(&booking.id), Some(booking));
}

#[tokio::test]
async fn test_missing_fields_never_reach_the_store() {
    let f = setup(10);
    let mut request = plot_request(&f, 0);
    request.buyer = BuyerContact { name: "Asha".to_string(), phone: "   ".to_string(), ..BuyerContact::default() };

    let err = f.committer.book(request).await.unwrap_err();

    assert_eq!(err, BookingError::MissingFields(vec![RequiredField::Phone]));
    assert_eq!(err.recovery(), Recovery::FixInput);
    assert_eq!(f.backend.total_calls(), 0);
}

#[tokio::test]
async fn test_sold_out_block_is_rejected() {
    let f = setup(1);
    f.committer.book(plot_request(&f, 0)).await.unwrap();

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert_eq!(err, BookingError::Rejected(IneligibleReason::SoldOut));
    assert_eq!(err.attempt_state(), AttemptState::Rejected);
    assert_eq!(f.backend.call_count("decrement_available_plots"), 1);
}

#[tokio::test]
async fn test_out_of_range_slot_is_invalid_selection() {
    let f = setup(2);

    let err = f.committer.book(plot_request(&f, 2)).await.unwrap_err();

    assert_eq!(err, BookingError::Rejected(IneligibleReason::InvalidSelection));
    assert_eq!(available(&f), 2);
}

#[tokio::test]
async fn test_largest_slot_index_is_rejected_with_tracing_enabled() {
    let f = setup(2);

    let err = f.committer.book(plot_request(&f, u32::MAX)).await.unwrap_err();

    assert_eq!(err, BookingError::Rejected(IneligibleReason::InvalidSelection));
    assert_eq!(f.backend.call_count("decrement_available_plots"), 0);
    assert_eq!(available(&f), 2);
}

#[tokio::test]
async fn test_unavailable_property_is_rejected() {
    let f = setup(5);
    let mut closed = f.property.clone();
    closed.is_available = false;
    f.backend.seed_property(closed);

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert_eq!(err, BookingError::Rejected(IneligibleReason::PropertyUnavailable));
    assert_eq!(err.recovery(), Recovery::Requery);
}

#[tokio::test]
async fn test_unknown_property_is_not_found() {
    let f = setup(5);
    let mut request = plot_request(&f, 0);
    request.selection = UnitSelection::Plot {
        property_id: PropertyId::new("PROP-TN-20250101999"),
        block: f.block.id,
        slot: PlotSlot::new(0),
    };

    let err = f.committer.book(request).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));
    assert_eq!(err.recovery(), Recovery::None);
}

#[tokio::test]
async fn test_whole_property_booking_claims_and_prices_property() {
    init_test_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let property = fixtures::property(UserId::new(), "PROP-TN-20250101002");
    backend.seed_property(property.clone());
    let committer = BookingCommitter::new(booking_environment(&backend, BookingConfig::default()));
    let request = BookingRequest {
        selection: UnitSelection::WholeProperty { property_id: property.id.clone() },
        buyer: fixtures::buyer(),
        notes: None,
    };

    let booking = committer.book(request.clone()).await.unwrap();
    assert_eq!(booking.block_id, None);
    assert_eq!(booking.total_price, Decimal::from(5_000_000));
    assert!(!backend.property(&property.id).unwrap().is_available);

    let err = committer.book(request).await.unwrap_err();
    assert_eq!(err, BookingError::Rejected(IneligibleReason::PropertyUnavailable));
}

#[tokio::test]
async fn test_whole_property_selection_on_plotted_property_is_invalid() {
    let f = setup(5);
    let request = BookingRequest {
        selection: UnitSelection::WholeProperty { property_id: f.property.id.clone() },
        buyer: fixtures::buyer(),
        notes: None,
    };

    let err = f.committer.book(request).await.unwrap_err();
    assert_eq!(err, BookingError::Rejected(IneligibleReason::InvalidSelection));
    assert_eq!(f.backend.call_count("claim_property"), 0);
}

#[tokio::test]
async fn test_divergent_stored_price_is_replaced_in_snapshot() {
    let f = setup(5);
    let mut stale = f.block.clone();
    stale.total_price_per_plot = Some(Decimal::from(2_500_000));
    f.backend.seed_blocks([stale]);

    let booking = f.committer.book(plot_request(&f, 0)).await.unwrap();
    assert_eq!(booking.total_price, Decimal::from(3_000_000));
}

/// N+1 concurrent attempts on distinct slots of an N-plot block.
///
/// Every attempt reads the block before any write lands, so slots 0..N are
/// eligible and slot N is not. The conditional decrement admits exactly N.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_n_bookings_for_n_plots() {
    const N: u32 = 8;
    let f = setup(N);
    f.backend.delay_reads(Duration::from_millis(50));
    let committer = Arc::new(f.committer.clone());

    let handles: Vec<_> = (0..=N)
        .map(|slot| {
            let committer = Arc::clone(&committer);
            let request = plot_request(&f, slot);
            tokio::spawn(async move { committer.book(request).await })
        })
        .collect();
    let results: Vec<_> =
        futures::future::join_all(handles).await.into_iter().map(|r| r.expect("Task panicked")).collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::Conflict | BookingError::Rejected(_))))
        .count();
    assert_eq!(committed, N as usize);
    assert_eq!(refused, 1);
    assert_eq!(available(&f), 0);
    assert_eq!(f.backend.bookings().len(), N as usize);
}

/// N+1 concurrent attempts that all saw the same snapshot and picked slot 0.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_losing_the_race_is_a_conflict() {
    const N: u32 = 5;
    let f = setup(N);
    f.backend.delay_reads(Duration::from_millis(50));
    let committer = Arc::new(f.committer.clone());

    let handles: Vec<_> = (0..=N)
        .map(|_| {
            let committer = Arc::clone(&committer);
            let request = plot_request(&f, 0);
            tokio::spawn(async move { committer.book(request).await })
        })
        .collect();
    let results: Vec<_> =
        futures::future::join_all(handles).await.into_iter().map(|r| r.expect("Task panicked")).collect();

    let conflicts: Vec<_> = results.iter().filter(|r| matches!(r, Err(BookingError::Conflict))).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), N as usize);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(BookingError::Conflict.recovery(), Recovery::Requery);
    assert_eq!(available(&f), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_counter_and_bookings_agree_under_load() {
    const N: u32 = 10;
    let f = setup(N);
    let committer = Arc::new(f.committer.clone());

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let committer = Arc::clone(&committer);
            let request = plot_request(&f, i % N);
            tokio::spawn(async move { committer.book(request).await })
        })
        .collect();
    let results: Vec<_> =
        futures::future::join_all(handles).await.into_iter().map(|r| r.expect("Task panicked")).collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert!(committed <= N as usize);
    assert_eq!(f.backend.bookings().len(), committed);
    assert_eq!(available(&f) as usize, N as usize - committed);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(e) => matches!(e, BookingError::Conflict | BookingError::Rejected(_)),
    }));
}

#[tokio::test]
async fn test_failed_insert_is_compensated() {
    let f = setup(4);
    f.backend.fail_next_booking_inserts(1);

    let err = f.committer.book(plot_request(&f, 1)).await.unwrap_err();

    assert!(matches!(err, BookingError::Store(_)));
    assert_eq!(err.recovery(), Recovery::RetryLater);
    assert_eq!(available(&f), 4);
    assert!(f.backend.bookings().is_empty());
    assert_eq!(f.backend.call_count("increment_available_plots"), 1);

    // Caller-initiated retry succeeds.
    assert!(f.committer.book(plot_request(&f, 1)).await.is_ok());
    assert_eq!(available(&f), 3);
}

#[tokio::test]
async fn test_failed_whole_property_insert_releases_property() {
    init_test_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let property = fixtures::property(UserId::new(), "PROP-TN-20250101003");
    backend.seed_property(property.clone());
    backend.fail_next_booking_inserts(1);
    let committer = BookingCommitter::new(booking_environment(&backend, BookingConfig::default()));

    let err = committer
        .book(BookingRequest {
            selection: UnitSelection::WholeProperty { property_id: property.id.clone() },
            buyer: fixtures::buyer(),
            notes: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Store(_)));
    assert!(backend.property(&property.id).unwrap().is_available);
}

#[tokio::test]
async fn test_failed_compensation_is_reported() {
    let f = setup(4);
    f.backend.fail_next_booking_inserts(1);
    f.backend.fail_next_compensations(1);

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert!(matches!(err, BookingError::CompensationFailed { .. }));
    assert_eq!(err.attempt_state(), AttemptState::Failed);
    assert_eq!(err.recovery(), Recovery::RetryLater);
    assert_eq!(available(&f), 3);
}

#[tokio::test]
async fn test_timeout_before_write_changes_nothing() {
    let config = BookingConfig { request_timeout: Duration::from_millis(30), ..BookingConfig::default() };
    let f = setup_with(config, 4);
    f.backend.delay_reads(Duration::from_millis(300));

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert!(matches!(err, BookingError::Timeout { operation: "fetch_property", .. }));
    assert_eq!(err.attempt_state(), AttemptState::Failed);
    assert_eq!(f.backend.call_count("decrement_available_plots"), 0);
    assert_eq!(available(&f), 4);
}

#[tokio::test]
async fn test_insert_timeout_is_compensated() {
    let config = BookingConfig { request_timeout: Duration::from_millis(30), ..BookingConfig::default() };
    let f = setup_with(config, 4);
    f.backend.delay_booking_inserts(Duration::from_millis(300));

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert!(matches!(err, BookingError::Timeout { operation: "insert_booking", .. }));
    assert_eq!(available(&f), 4);
    assert!(f.backend.bookings().is_empty());
}

#[tokio::test]
async fn test_unacknowledged_decrement_fails_without_compensation() {
    let config = BookingConfig { request_timeout: Duration::from_millis(30), ..BookingConfig::default() };
    let f = setup_with(config, 4);
    f.backend.delay_inventory_writes(Duration::from_millis(300));

    let err = f.committer.book(plot_request(&f, 0)).await.unwrap_err();

    assert!(matches!(err, BookingError::Timeout { operation: "decrement_available_plots", .. }));
    assert_eq!(err.recovery(), Recovery::RetryLater);
    // The write landed but was never acknowledged; it is left for reconciliation.
    assert_eq!(available(&f), 3);
    assert_eq!(f.backend.call_count("increment_available_plots"), 0);
    assert_eq!(f.backend.call_count("insert_booking"), 0);
}

#[tokio::test]
async fn test_quote_matches_committed_price() {
    let f = setup(3);
    let request = plot_request(&f, 0);

    let quoted = f.committer.quote(&request.selection).await.unwrap();
    let booking = f.committer.book(request).await.unwrap();
    assert_eq!(quoted, booking.total_price);
}
