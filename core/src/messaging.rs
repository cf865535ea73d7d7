//! Buyer/owner messaging about a property.
//!
//! Conversations are never stored. They are derived by grouping a user's
//! messages by `(other participant, property)`, so a [`ConversationKey`] can
//! always be rebuilt from message rows alone. Within a conversation the only
//! ordering contract is `created_at` ascending.

use crate::config::BookingConfig;
use crate::environment::Clock;
use crate::error::Recovery;
use crate::realtime::{FeedError, MessageFeed, MessageFilter, Subscription};
use crate::store::{CallError, ListingStore, MessageStore, StoreError, bounded};
use crate::types::{Message, MessageId, PropertyId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`MessagingService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The message body is blank.
    #[error("message content must not be empty")]
    EmptyContent,

    /// Sender and receiver are the same user.
    #[error("cannot send a message to yourself")]
    SelfMessage,

    /// The property does not exist.
    #[error("property not found: {0}")]
    PropertyNotFound(PropertyId),

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

    /// The realtime feed refused the subscription.
    #[error(transparent)]
    Feed(#[from] FeedError),
}

impl MessagingError {
    /// How the caller should react.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::EmptyContent | Self::SelfMessage => Recovery::FixInput,
            Self::PropertyNotFound(_) => Recovery::None,
            Self::Store(_) | Self::Timeout { .. } | Self::Feed(_) => Recovery::RetryLater,
        }
    }
}

impl From<CallError> for MessagingError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(store) => Self::Store(store),
            CallError::Timeout { operation, limit } => Self::Timeout { operation, limit },
        }
    }
}

/// Identity of a conversation from one participant's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// The other participant
    pub other: UserId,
    /// The property being discussed
    pub property_id: PropertyId,
}

impl ConversationKey {
    /// Key of the conversation `message` belongs to, as seen by `me`.
    ///
    /// `None` if `me` neither sent nor received the message.
    #[must_use]
    pub fn for_message(me: &UserId, message: &Message) -> Option<Self> {
        let other = if message.sender_id == *me {
            message.receiver_id
        } else if message.receiver_id == *me {
            message.sender_id
        } else {
            return None;
        };
        Some(Self { other, property_id: message.property_id.clone() })
    }
}

/// A derived conversation summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Participants and property
    pub key: ConversationKey,
    /// Most recent message
    pub last_message: Message,
    /// Number of messages exchanged
    pub message_count: usize,
}

impl Conversation {
    /// Time of the most recent message.
    #[must_use]
    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_message.created_at
    }
}

/// Group `messages` into conversations for `me`, most recent activity first.
///
/// Messages that do not involve `me` are ignored.
#[must_use]
pub fn group_conversations(me: &UserId, messages: &[Message]) -> Vec<Conversation> {
    let mut grouped: HashMap<ConversationKey, Conversation> = HashMap::new();
    for message in messages {
        let Some(key) = ConversationKey::for_message(me, message) else {
            continue;
        };
        grouped
            .entry(key.clone())
            .and_modify(|conversation| {
                conversation.message_count += 1;
                if message.created_at >= conversation.last_message.created_at {
                    conversation.last_message = message.clone();
                }
            })
            .or_insert_with(|| Conversation { key, last_message: message.clone(), message_count: 1 });
    }
    let mut conversations: Vec<Conversation> = grouped.into_values().collect();
    conversations.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| a.key.property_id.cmp(&b.key.property_id))
            .then_with(|| a.key.other.cmp(&b.key.other))
    });
    conversations
}

/// Messaging between buyers and owners.
#[derive(Clone)]
pub struct MessagingService {
    messages: Arc<dyn MessageStore>,
    listings: Arc<dyn ListingStore>,
    feed: Arc<dyn MessageFeed>,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
}

impl MessagingService {
    /// Creates a new `MessagingService`
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageStore>,
        listings: Arc<dyn ListingStore>,
        feed: Arc<dyn MessageFeed>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            messages,
            listings,
            feed,
            clock,
            config,
        }
    }

    /// Send a message about a property.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::EmptyContent`] / [`MessagingError::SelfMessage`] for bad input
    /// - [`MessagingError::PropertyNotFound`] if the property does not exist
    /// - [`MessagingError::Store`] / [`MessagingError::Timeout`] on store failure
    #[tracing::instrument(skip_all, fields(sender = %sender, receiver = %receiver, property_id = %property_id))]
    pub async fn send_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        property_id: &PropertyId,
        content: &str,
    ) -> Result<Message, MessagingError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessagingError::EmptyContent);
        }
        if sender == receiver {
            return Err(MessagingError::SelfMessage);
        }
        let limit = self.config.request_timeout;
        if bounded(limit, "fetch_property", self.listings.fetch_property(property_id)).await?.is_none() {
            return Err(MessagingError::PropertyNotFound(property_id.clone()));
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: *sender,
            receiver_id: *receiver,
            property_id: property_id.clone(),
            content: content.to_string(),
            created_at: self.clock.now(),
        };
        let stored = bounded(limit, "insert_message", self.messages.insert_message(message)).await?;
        tracing::debug!(message_id = %stored.id, "Message sent");
        Ok(stored)
    }

    /// Conversations of `user`, most recent activity first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Store`] / [`MessagingError::Timeout`] on store failure.
    pub async fn conversations(&self, user: &UserId) -> Result<Vec<Conversation>, MessagingError> {
        let messages =
            bounded(self.config.request_timeout, "messages_for_user", self.messages.messages_for_user(user)).await?;
        Ok(group_conversations(user, &messages))
    }

    /// Messages between `user` and `other` about one property, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Store`] / [`MessagingError::Timeout`] on store failure.
    pub async fn thread(
        &self,
        user: &UserId,
        other: &UserId,
        property_id: &PropertyId,
    ) -> Result<Vec<Message>, MessagingError> {
        let key = ConversationKey { other: *other, property_id: property_id.clone() };
        let mut messages: Vec<Message> =
            bounded(self.config.request_timeout, "messages_for_user", self.messages.messages_for_user(user))
                .await?
                .into_iter()
                .filter(|message| ConversationKey::for_message(user, message).as_ref() == Some(&key))
                .collect();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }

    /// Receive new messages addressed to `user`, optionally about one property.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Feed`] if the subscription cannot be established.
    pub async fn subscribe(
        &self,
        user: &UserId,
        property_id: Option<PropertyId>,
    ) -> Result<Subscription, MessagingError> {
        let filter = match property_id {
            Some(property_id) => MessageFilter::for_property(*user, property_id),
            None => MessageFilter::inbox(*user),
        };
        Ok(self.feed.subscribe(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, minute, 0).single().unwrap_or_default()
    }

    fn message(from: UserId, to: UserId, property: &str, minute: u32) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: from,
            receiver_id: to,
            property_id: PropertyId::new(property),
            content: format!("message at {minute}"),
            created_at: at(minute),
        }
    }

    #[test]
    fn groups_by_participant_and_property() {
        let me = UserId::new();
        let owner = UserId::new();
        let other_owner = UserId::new();
        let messages = vec![
            message(me, owner, "PROP-TN-1", 1),
            message(owner, me, "PROP-TN-1", 2),
            message(me, owner, "PROP-TN-2", 3),
            message(other_owner, me, "PROP-TN-1", 0),
            message(owner, other_owner, "PROP-TN-1", 9),
        ];

        let conversations = group_conversations(&me, &messages);
        assert_eq!(conversations.len(), 3);
        assert_eq!(conversations[0].key.property_id.as_str(), "PROP-TN-2");
        assert_eq!(conversations[1].key, ConversationKey { other: owner, property_id: PropertyId::new("PROP-TN-1") });
        assert_eq!(conversations[1].message_count, 2);
        assert_eq!(conversations[1].last_activity(), at(2));
        assert_eq!(conversations[2].key.other, other_owner);
    }

    #[test]
    fn key_is_symmetric_in_direction() {
        let me = UserId::new();
        let them = UserId::new();
        let sent = message(me, them, "PROP-TN-1", 1);
        let received = message(them, me, "PROP-TN-1", 2);
        assert_eq!(ConversationKey::for_message(&me, &sent), ConversationKey::for_message(&me, &received));
        assert_eq!(ConversationKey::for_message(&UserId::new(), &sent), None);
    }
}
