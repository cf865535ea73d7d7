//! Messaging: sending, derived conversations and the realtime feed.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use futures::StreamExt;
use plotbook_core::config::BookingConfig;
use plotbook_core::environment::Clock;
use plotbook_core::error::Recovery;
use plotbook_core::messaging::{ConversationKey, MessagingError, MessagingService};
use plotbook_core::types::{Property, PropertyId, UserId};
use plotbook_testing::{InMemoryBackend, fixtures, test_clock};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    backend: Arc<InMemoryBackend>,
    service: MessagingService,
    owner: UserId,
    buyer: UserId,
    property: Property,
}

fn setup() -> Fixture {
    let backend = Arc::new(InMemoryBackend::new());
    let owner = UserId::new();
    let property = fixtures::property(owner, "PROP-TN-20250101001");
    backend.seed_property(property.clone());
    let service = MessagingService::new(
        backend.clone(),
        backend.clone(),
        Arc::new(backend.feed()),
        Arc::new(test_clock()),
        BookingConfig::default(),
    );
    Fixture { backend, service, owner, buyer: UserId::new(), property }
}

#[tokio::test]
async fn test_send_message_trims_and_stores() {
    let f = setup();

    let message = f.service.send_message(&f.buyer, &f.owner, &f.property.id, "  Is block A open?  ").await.unwrap();

    assert_eq!(message.content, "Is block A open?");
    assert_eq!(f.backend.messages(), vec![message]);
}

#[tokio::test]
async fn test_send_message_validation() {
    let f = setup();

    let err = f.service.send_message(&f.buyer, &f.owner, &f.property.id, "   ").await.unwrap_err();
    assert_eq!(err, MessagingError::EmptyContent);
    assert_eq!(err.recovery(), Recovery::FixInput);

    let err = f.service.send_message(&f.buyer, &f.buyer, &f.property.id, "hello").await.unwrap_err();
    assert_eq!(err, MessagingError::SelfMessage);

    let err = f.service.send_message(&f.buyer, &f.owner, &PropertyId::new("PROP-TN-404"), "hello").await.unwrap_err();
    assert!(matches!(err, MessagingError::PropertyNotFound(_)));

    assert!(f.backend.messages().is_empty());
    assert_eq!(f.backend.call_count("insert_message"), 0);
}

#[tokio::test]
async fn test_conversations_group_by_participant_and_property() {
    let f = setup();
    let second = fixtures::property(f.owner, "PROP-TN-20250101002");
    f.backend.seed_property(second.clone());
    let other_buyer = UserId::new();

    f.service.send_message(&f.buyer, &f.owner, &f.property.id, "Price negotiable?").await.unwrap();
    f.service.send_message(&f.owner, &f.buyer, &f.property.id, "Slightly").await.unwrap();
    f.service.send_message(&f.buyer, &f.owner, &second.id, "And this one?").await.unwrap();
    f.service.send_message(&other_buyer, &f.owner, &f.property.id, "Site visit?").await.unwrap();

    let owner_view = f.service.conversations(&f.owner).await.unwrap();
    assert_eq!(owner_view.len(), 3);
    let with_buyer = owner_view
        .iter()
        .find(|c| c.key == ConversationKey { other: f.buyer, property_id: f.property.id.clone() })
        .unwrap();
    assert_eq!(with_buyer.message_count, 2);

    let buyer_view = f.service.conversations(&f.buyer).await.unwrap();
    assert_eq!(buyer_view.len(), 2);
    assert!(buyer_view.iter().all(|c| c.key.other == f.owner));
}

#[tokio::test]
async fn test_thread_is_oldest_first() {
    let f = setup();
    let base = test_clock().now();
    for (minutes, (from, to)) in [(5, (f.owner, f.buyer)), (1, (f.buyer, f.owner)), (3, (f.buyer, f.owner))] {
        let mut message = fixtures::message(from, to, &f.property.id, &format!("at {minutes}"));
        message.created_at = base + chrono::Duration::minutes(minutes);
        f.backend.seed_message(message);
    }

    let thread = f.service.thread(&f.buyer, &f.owner, &f.property.id).await.unwrap();

    let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["at 1", "at 3", "at 5"]);
}

#[tokio::test]
async fn test_subscription_receives_new_messages_until_cancelled() {
    let f = setup();
    let feed = f.backend.feed();
    let mut subscription = f.service.subscribe(&f.owner, Some(f.property.id.clone())).await.unwrap();
    assert_eq!(feed.active_subscriptions(), 1);

    f.service.send_message(&f.owner, &f.buyer, &f.property.id, "not for the owner").await.unwrap();
    f.service.send_message(&f.buyer, &f.owner, &f.property.id, "Booked plot 3").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), subscription.next()).await.unwrap().unwrap();
    assert_eq!(received.content, "Booked plot 3");

    subscription.cancel();
    assert!(subscription.is_cancelled());
    assert_eq!(feed.active_subscriptions(), 0);
    assert!(subscription.next().await.is_none());
}
