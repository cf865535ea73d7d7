//! Realtime delivery of newly inserted messages.
//!
//! A [`MessageFeed`] turns message inserts into a stream for subscribers.
//! Delivery is best-effort: a subscriber that lags or reconnects should
//! re-read its threads through the message store, which stays the source of
//! truth for ordering.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use plotbook_core::realtime::{MessageFeed, MessageFilter};
//!
//! async fn inbox(feed: &dyn MessageFeed, me: UserId) -> Result<(), FeedError> {
//!     let mut subscription = feed.subscribe(MessageFilter::inbox(me)).await?;
//!     while let Some(message) = subscription.next().await {
//!         println!("{}: {}", message.sender_id, message.content);
//!     }
//!     Ok(())
//! }
//! ```

use crate::types::{Message, PropertyId, UserId};
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

/// Errors that can occur while subscribing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Failed to connect to the notification channel
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to register the subscription
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
}

/// Which inserted messages a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    /// Only messages addressed to this user
    pub receiver_id: UserId,
    /// Only messages about this property, if set
    pub property_id: Option<PropertyId>,
}

impl MessageFilter {
    /// Every message addressed to `receiver`.
    #[must_use]
    pub const fn inbox(receiver: UserId) -> Self {
        Self { receiver_id: receiver, property_id: None }
    }

    /// Messages addressed to `receiver` about one property.
    #[must_use]
    pub const fn for_property(receiver: UserId, property_id: PropertyId) -> Self {
        Self { receiver_id: receiver, property_id: Some(property_id) }
    }

    /// Whether `message` passes the filter.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        message.receiver_id == self.receiver_id
            && self.property_id.as_ref().is_none_or(|id| *id == message.property_id)
    }
}

/// A live subscription. Yields matching messages until cancelled.
///
/// Dropping the subscription cancels it.
pub struct Subscription {
    stream: Option<Pin<Box<dyn Stream<Item = Message> + Send>>>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a message stream together with the hook that tears it down.
    #[must_use]
    pub fn new(
        stream: Pin<Box<dyn Stream<Item = Message> + Send>>,
        on_cancel: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self { stream: Some(stream), on_cancel: Some(on_cancel) }
    }

    /// Stop receiving messages. Subsequent polls yield `None`.
    pub fn cancel(&mut self) {
        self.stream = None;
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }

    /// Whether [`Subscription::cancel`] has been called.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.stream.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("cancelled", &self.is_cancelled()).finish()
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.stream.as_mut() {
            Some(stream) => stream.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Source of realtime message inserts.
pub trait MessageFeed: Send + Sync {
    /// Start receiving inserted messages that match `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the subscription cannot be established.
    fn subscribe(
        &self,
        filter: MessageFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription, FeedError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;
    use chrono::Utc;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn message(receiver: UserId, property: &str) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: UserId::new(),
            receiver_id: receiver,
            property_id: PropertyId::new(property),
            content: "Is this plot still available?".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filter_matches_receiver_and_property() {
        let me = UserId::new();
        let inbox = MessageFilter::inbox(me);
        let scoped = MessageFilter::for_property(me, PropertyId::new("PROP-TN-1"));

        assert!(inbox.matches(&message(me, "PROP-TN-2")));
        assert!(scoped.matches(&message(me, "PROP-TN-1")));
        assert!(!scoped.matches(&message(me, "PROP-TN-2")));
        assert!(!inbox.matches(&message(UserId::new(), "PROP-TN-1")));
    }

    #[tokio::test]
    async fn cancel_runs_hook_once_and_ends_stream() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let me = UserId::new();
        let stream = futures::stream::iter(vec![message(me, "PROP-TN-1")]);
        let mut subscription = Subscription::new(
            Box::pin(stream),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        assert!(subscription.next().await.is_some());
        subscription.cancel();
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(subscription.is_cancelled());
        assert!(subscription.next().await.is_none());
    }
}
