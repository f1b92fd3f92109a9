use crate::{now_millis, Conversation, ConversationId, Error, Result, StorageAdapter, UserId};
use std::sync::{Arc, Mutex};

/// Conversation identity resolution: one row per unordered user pair,
/// created lazily on first contact. Stored under a canonical pair key
/// so (A,B) and (B,A) resolve identically, with a second index from
/// conversation id back to the pair key.
pub struct ConversationDirectory {
    storage: Arc<dyn StorageAdapter>,
    // Serializes lookup-and-insert so racing callers cannot both miss
    // and create duplicate rows for the same pair.
    write_lock: Mutex<()>,
}

fn pair_key(a: &UserId, b: &UserId) -> String {
    let (lo, hi) = if a.as_str() <= b.as_str() {
        (a, b)
    } else {
        (b, a)
    };
    format!("conversation/{lo}:{hi}")
}

fn id_key(id: &ConversationId) -> String {
    format!("conversation-id/{id}")
}

impl ConversationDirectory {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Idempotent get-or-create for the pair {caller, other}. The whole
    /// lookup-else-insert runs under one lock; a two-step
    /// check-then-insert without it would let two racing callers create
    /// two rows for the same pair. Returns whether the row was created
    /// by this call.
    pub fn get_or_create(&self, caller: &UserId, other: &UserId) -> Result<(Conversation, bool)> {
        if caller == other {
            return Err(Error::InvalidArgument(
                "cannot open a conversation with yourself".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().unwrap();

        let key = pair_key(caller, other);
        if let Some(raw) = self.storage.get(&key)? {
            return Ok((serde_json::from_str(&raw)?, false));
        }

        let (lo, hi) = if caller.as_str() <= other.as_str() {
            (caller.clone(), other.clone())
        } else {
            (other.clone(), caller.clone())
        };
        let now = now_millis();
        let conversation = Conversation {
            id: ConversationId::generate(),
            user_lo: lo,
            user_hi: hi,
            created_at: now,
            last_message_at: now,
        };

        self.storage
            .put(&key, serde_json::to_string(&conversation)?)?;
        self.storage.put(&id_key(&conversation.id), key)?;

        tracing::debug!(conversation = %conversation.id, "created conversation");
        Ok((conversation, true))
    }

    pub fn by_id(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let Some(key) = self.storage.get(&id_key(id))? else {
            return Ok(None);
        };
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// All conversations involving `user`, most recent activity first.
    pub fn for_user(&self, user: &UserId) -> Result<Vec<Conversation>> {
        let mut out = Vec::new();
        for key in self.storage.keys("conversation/")? {
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            let Ok(conversation) = serde_json::from_str::<Conversation>(&raw) else {
                continue;
            };
            if conversation.involves(user) {
                out.push(conversation);
            }
        }
        out.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(out)
    }

    /// Advance last-activity. Separate from message insertion on
    /// purpose; callers tolerate the window between the two writes.
    pub fn touch(&self, id: &ConversationId, at: u64) -> Result<Option<Conversation>> {
        let _guard = self.write_lock.lock().unwrap();

        let Some(mut conversation) = self.by_id(id)? else {
            return Ok(None);
        };
        if at > conversation.last_message_at {
            conversation.last_message_at = at;
            let key = pair_key(&conversation.user_lo, &conversation.user_hi);
            self.storage
                .put(&key, serde_json::to_string(&conversation)?)?;
        }
        Ok(Some(conversation))
    }
}
