use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on a message body, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Opaque stable user identifier, issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unique pairing record between two users. `user_lo`/`user_hi`
/// hold the pair in lexicographic order so the same two users always
/// map to the same row regardless of who initiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub user_lo: UserId,
    pub user_hi: UserId,
    pub created_at: u64,
    pub last_message_at: u64,
}

impl Conversation {
    pub fn involves(&self, user: &UserId) -> bool {
        &self.user_lo == user || &self.user_hi == user
    }

    /// The other participant, or None if `user` is not in the pair.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if &self.user_lo == user {
            Some(&self.user_hi)
        } else if &self.user_hi == user {
            Some(&self.user_lo)
        } else {
            None
        }
    }
}

/// Immutable once appended, except for the single `read_at` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    /// Per-conversation insertion sequence. Total order within the
    /// conversation; tie-break for equal `created_at`.
    pub seq: u64,
    pub created_at: u64,
    pub read_at: Option<u64>,
}

/// Public profile snippet used to decorate summaries and chat headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: UserId,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Placeholder for counterparts with no stored profile row.
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            full_name: None,
            avatar_url: None,
        }
    }
}

/// One row of the conversation list, computed server-side per viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub counterpart: Profile,
    pub last_message: Option<LastMessage>,
    pub unread_count: u64,
    pub last_message_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub body: String,
    pub sender_id: UserId,
    pub created_at: u64,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
