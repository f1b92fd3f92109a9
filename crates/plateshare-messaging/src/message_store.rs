use crate::{
    now_millis, Change, ChangeFeed, Conversation, ConversationId, Error, Message, MessageId,
    Result, StorageAdapter, Topic, UserId, MAX_MESSAGE_CHARS,
};
use std::sync::{Arc, Mutex};

/// Append-only ordered message log, one partition per conversation.
/// Rows live under zero-padded sequence keys so a sorted prefix scan
/// *is* the log order; the sequence doubles as the `list_since` cursor
/// and as the tie-break when two messages share a timestamp.
pub struct MessageStore {
    storage: Arc<dyn StorageAdapter>,
    feed: ChangeFeed,
    // Guards sequence assignment; two appends must never share a seq.
    seq_lock: Mutex<()>,
}

fn row_key(conversation: &ConversationId, seq: u64) -> String {
    format!("message/{conversation}/{seq:08}")
}

fn seq_key(conversation: &ConversationId) -> String {
    format!("message-seq/{conversation}")
}

impl MessageStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, feed: ChangeFeed) -> Self {
        Self {
            storage,
            feed,
            seq_lock: Mutex::new(()),
        }
    }

    /// Validate, assign the next sequence, persist, and fan out the
    /// insert on the conversation's message topic. The caller owns the
    /// follow-up last-activity bump on the conversation row; the two
    /// writes are deliberately not atomic.
    pub fn append(
        &self,
        conversation: &Conversation,
        sender: &UserId,
        body: &str,
    ) -> Result<Message> {
        if !conversation.involves(sender) {
            return Err(Error::Forbidden);
        }

        let body = body.trim();
        if body.is_empty() {
            return Err(Error::InvalidArgument("message body is empty".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(Error::InvalidArgument(format!(
                "message body exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let _guard = self.seq_lock.lock().unwrap();

        let seq = self.next_seq(&conversation.id)?;
        // Counter first: if the row write fails the sequence number is
        // burned as a gap instead of being handed out again over a row
        // that already landed.
        self.storage
            .put(&seq_key(&conversation.id), seq.to_string())?;

        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation.id.clone(),
            sender_id: sender.clone(),
            body: body.to_string(),
            seq,
            created_at: now_millis(),
            read_at: None,
        };
        self.storage.put(
            &row_key(&conversation.id, seq),
            serde_json::to_string(&message)?,
        )?;

        // Publish while still holding the lock: subscribers must see
        // inserts in commit order, and the unbounded channel means the
        // send cannot block.
        self.feed.publish(
            &Topic::Messages(conversation.id.clone()),
            Change::MessageInserted(message.clone()),
        );

        Ok(message)
    }

    /// Messages in ascending log order, optionally only those after
    /// the given sequence cursor.
    pub fn list_since(
        &self,
        conversation: &ConversationId,
        cursor: Option<u64>,
    ) -> Result<Vec<Message>> {
        let prefix = format!("message/{conversation}/");
        let mut out = Vec::new();
        for key in self.storage.keys(&prefix)? {
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            let Ok(message) = serde_json::from_str::<Message>(&raw) else {
                tracing::warn!(%key, "skipping undecodable message row");
                continue;
            };
            if cursor.is_some_and(|c| message.seq <= c) {
                continue;
            }
            out.push(message);
        }
        Ok(out)
    }

    /// The most recent message, if any.
    pub fn last(&self, conversation: &ConversationId) -> Result<Option<Message>> {
        let prefix = format!("message/{conversation}/");
        let keys = self.storage.keys(&prefix)?;
        let Some(key) = keys.last() else {
            return Ok(None);
        };
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Rewrite a row in place. Only the read-state transition uses
    /// this; bodies never change after append.
    pub(crate) fn persist(&self, message: &Message) -> Result<()> {
        self.storage.put(
            &row_key(&message.conversation_id, message.seq),
            serde_json::to_string(message)?,
        )
    }

    fn next_seq(&self, conversation: &ConversationId) -> Result<u64> {
        let current = match self.storage.get(&seq_key(conversation))? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| Error::Storage(format!("corrupt sequence counter: {e}")))?,
            None => 0,
        };
        Ok(current + 1)
    }
}
