//! Realtime message feed over `LISTEN`/`NOTIFY`.
//!
//! [`PostgresStore::insert_message`](crate::PostgresStore) notifies
//! [`MESSAGE_CHANNEL`] with the stored message as JSON inside the insert
//! transaction, so subscribers only see committed messages. Each subscription
//! holds its own listener connection, which is closed on cancel.

use crate::store::MESSAGE_CHANNEL;
use plotbook_core::realtime::{FeedError, MessageFeed, MessageFilter, Subscription};
use plotbook_core::types::Message;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::future::Future;
use std::pin::Pin;

/// [`MessageFeed`] backed by `PostgreSQL` notifications.
#[derive(Clone)]
pub struct PgMessageFeed {
    pool: PgPool,
}

impl PgMessageFeed {
    /// Creates a new `PgMessageFeed`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MessageFeed for PgMessageFeed {
    fn subscribe(
        &self,
        filter: MessageFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription, FeedError>> + Send + '_>> {
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
            listener
                .listen(MESSAGE_CHANNEL)
                .await
                .map_err(|e| FeedError::SubscriptionFailed(e.to_string()))?;

            let receiver = filter.receiver_id;
            let stream = async_stream::stream! {
                loop {
                    match listener.recv().await {
                        Ok(notification) => match serde_json::from_str::<Message>(notification.payload()) {
                            Ok(message) if filter.matches(&message) => yield message,
                            Ok(_) => {},
                            Err(error) => {
                                tracing::warn!(%error, "Discarding malformed message notification");
                            },
                        },
                        Err(error) => {
                            tracing::error!(%error, "Message listener failed");
                            break;
                        },
                    }
                }
            };

            tracing::debug!(%receiver, "Message subscription opened");
            metrics::gauge!("messages.subscriptions").increment(1.0);
            Ok(Subscription::new(
                Box::pin(stream),
                Box::new(move || {
                    tracing::debug!(%receiver, "Message subscription closed");
                    metrics::gauge!("messages.subscriptions").decrement(1.0);
                }),
            ))
        })
    }
}
