use crate::{
    now_millis, Change, ChangeFeed, Conversation, ConversationId, Error, MessageStore, Result,
    Topic, UserId,
};
use std::sync::Arc;

/// Read-state is derived, not stored: the unread count for a user is
/// the number of counterpart messages whose `read_at` is still unset.
/// `mark_read` is the only mutation and it is monotonic: a second
/// call with no new messages changes nothing.
pub struct ReadStateTracker {
    store: Arc<MessageStore>,
    feed: ChangeFeed,
}

impl ReadStateTracker {
    pub fn new(store: Arc<MessageStore>, feed: ChangeFeed) -> Self {
        Self { store, feed }
    }

    /// Stamp every unread counterpart message in the conversation and
    /// fan the updates out so the sender's open session sees the
    /// receipts. Returns how many rows transitioned.
    pub fn mark_read(&self, conversation: &Conversation, reader: &UserId) -> Result<u64> {
        if !conversation.involves(reader) {
            return Err(Error::Forbidden);
        }

        let now = now_millis();
        let mut transitioned = 0;

        for mut message in self.store.list_since(&conversation.id, None)? {
            if &message.sender_id == reader || message.read_at.is_some() {
                continue;
            }
            message.read_at = Some(now);
            self.store.persist(&message)?;
            self.feed.publish(
                &Topic::Messages(conversation.id.clone()),
                Change::MessageUpdated(message),
            );
            transitioned += 1;
        }

        if transitioned > 0 {
            tracing::debug!(conversation = %conversation.id, reader = %reader, transitioned, "marked messages read");
        }
        Ok(transitioned)
    }

    pub fn unread_count(&self, conversation: &ConversationId, viewer: &UserId) -> Result<u64> {
        let count = self
            .store
            .list_since(conversation, None)?
            .iter()
            .filter(|m| &m.sender_id != viewer && m.read_at.is_none())
            .count();
        Ok(count as u64)
    }
}
