//! In-memory realtime feed and object storage.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only poisoned locks panic

use plotbook_core::realtime::{FeedError, MessageFeed, MessageFilter, Subscription};
use plotbook_core::storage::{ObjectStorage, StorageError, StorageFuture, validate_object_path};
use plotbook_core::types::Message;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const FEED_CAPACITY: usize = 256;

/// Broadcast-backed [`MessageFeed`].
///
/// [`InMemoryBackend`](crate::InMemoryBackend) publishes every inserted
/// message here.
#[derive(Clone, Debug)]
pub struct InMemoryMessageFeed {
    sender: broadcast::Sender<Message>,
    active: Arc<AtomicUsize>,
}

impl InMemoryMessageFeed {
    /// Create a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender, active: Arc::new(AtomicUsize::new(0)) }
    }

    /// Deliver `message` to current subscribers.
    pub fn publish(&self, message: Message) {
        // No receivers is not an error for a feed.
        let _ = self.sender.send(message);
    }

    /// Number of subscriptions that have not been cancelled.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryMessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFeed for InMemoryMessageFeed {
    fn subscribe(
        &self,
        filter: MessageFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription, FeedError>> + Send + '_>> {
        let mut receiver = self.sender.subscribe();
        let active = Arc::clone(&self.active);
        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(message) if filter.matches(&message) => yield message,
                        Ok(_) => {},
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Message subscriber lagged");
                        },
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            active.fetch_add(1, Ordering::SeqCst);
            Ok(Subscription::new(
                Box::pin(stream),
                Box::new(move || {
                    active.fetch_sub(1, Ordering::SeqCst);
                }),
            ))
        })
    }
}

/// `HashMap`-backed [`ObjectStorage`].
///
/// Public URLs have the form `memory://storage/<bucket>/<path>`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: Arc<Mutex<HashMap<(String, String), (Vec<u8>, String)>>>,
    fail_removals: Arc<Mutex<bool>>,
}

impl InMemoryObjectStorage {
    const BASE: &'static str = "memory://storage";

    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every removal fail.
    pub fn fail_removals(&self, fail: bool) {
        *self.fail_removals.lock().unwrap() = fail;
    }

    /// Whether an object exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(&(bucket.to_string(), path.to_string()))
    }

    /// Content type an object was uploaded with.
    #[must_use]
    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .map(|(_, content_type)| content_type.clone())
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Whether no objects are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> StorageFuture<'_, String> {
        let key = (bucket.to_string(), path.to_string());
        let content_type = content_type.to_string();
        Box::pin(async move {
            validate_object_path(&key.1)?;
            let url = format!("{}/{}/{}", Self::BASE, key.0, key.1);
            self.objects.lock().unwrap().insert(key, (bytes, content_type));
            Ok(url)
        })
    }

    fn remove(&self, bucket: &str, path: &str) -> StorageFuture<'_, ()> {
        let key = (bucket.to_string(), path.to_string());
        Box::pin(async move {
            if *self.fail_removals.lock().unwrap() {
                return Err(StorageError::Transport("injected removal failure".to_string()));
            }
            match self.objects.lock().unwrap().remove(&key) {
                Some(_) => Ok(()),
                None => Err(StorageError::Rejected { status: 404, message: format!("{}/{}", key.0, key.1) }),
            }
        })
    }

    fn object_path(&self, bucket: &str, public_url: &str) -> Option<String> {
        public_url
            .strip_prefix(Self::BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.strip_prefix(bucket))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|path| !path.is_empty())
            .map(ToString::to_string)
    }
}
