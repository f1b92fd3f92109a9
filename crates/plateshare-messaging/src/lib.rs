//! Messaging core of the Plateshare food-sharing app, extracted as a
//! standalone service: conversation identity (one row per unordered
//! user pair), an append-only per-conversation message log, derived
//! read-state, per-topic realtime change streams, and server-side
//! conversation summaries.
//!
//! The client-side orchestration (chat sessions, the conversation list
//! view) lives in `plateshare-messaging-client` and talks to this crate
//! through [`MessagingBackend`].

mod backend;
mod changefeed;
mod directory;
mod error;
mod file_storage;
mod message_store;
mod profiles;
mod read_state;
mod storage;
mod types;

pub use backend::{ChatBackend, MessagingBackend};
pub use changefeed::{Change, ChangeFeed, Subscription, Topic};
pub use directory::ConversationDirectory;
pub use error::{Error, Result};
pub use file_storage::FileStorage;
pub use message_store::MessageStore;
pub use profiles::ProfileStore;
pub use read_state::ReadStateTracker;
pub use storage::{MemoryStorage, StorageAdapter};
pub use types::{
    now_millis, Conversation, ConversationId, ConversationSummary, LastMessage, Message,
    MessageId, Profile, UserId, MAX_MESSAGE_CHARS,
};
