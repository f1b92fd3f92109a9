use crate::{
    Change, ChangeFeed, Conversation, ConversationDirectory, ConversationId,
    ConversationSummary, Error, LastMessage, MemoryStorage, Message, MessageStore, Profile,
    ProfileStore, ReadStateTracker, Result, StorageAdapter, Subscription, Topic, UserId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The platform surface the client components program against:
/// transactional get-or-create, the ordered message log, the read-state
/// transition, server-side summaries, and per-topic change streams.
///
/// Every operation takes the caller's identity explicitly; there is no
/// ambient current-user state anywhere in this workspace.
pub trait MessagingBackend: Send + Sync {
    /// One conversation per unordered user pair, created on first use.
    fn get_or_create_conversation(
        &self,
        caller: &UserId,
        other: &UserId,
    ) -> Result<Conversation>;

    fn append(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> Result<Message>;

    /// Ascending log order; `cursor` is the last sequence the caller
    /// has already seen.
    fn list_since(
        &self,
        caller: &UserId,
        conversation: &ConversationId,
        cursor: Option<u64>,
    ) -> Result<Vec<Message>>;

    /// Idempotent: stamps every unread counterpart message. Returns
    /// the number of rows that transitioned.
    fn mark_read(&self, conversation: &ConversationId, reader: &UserId) -> Result<u64>;

    fn unread_count(&self, conversation: &ConversationId, viewer: &UserId) -> Result<u64>;

    /// The viewer's conversation list, most recent activity first,
    /// aggregated in one server-side pass.
    fn summaries(&self, viewer: &UserId) -> Result<Vec<ConversationSummary>>;

    fn profile(&self, user: &UserId) -> Result<Option<Profile>>;

    fn subscribe_messages(
        &self,
        caller: &UserId,
        conversation: &ConversationId,
    ) -> Result<Subscription>;

    fn subscribe_conversations(&self, user: &UserId) -> Result<Subscription>;
}

/// Reference backend over a pluggable [`StorageAdapter`] plus an
/// in-process [`ChangeFeed`]. One instance plays the role of the
/// hosted data platform: both participants (and tests simulating
/// several devices) share it.
pub struct ChatBackend {
    directory: ConversationDirectory,
    messages: Arc<MessageStore>,
    read_state: ReadStateTracker,
    profiles: ProfileStore,
    feed: ChangeFeed,
    offline: AtomicBool,
}

impl ChatBackend {
    /// `storage` defaults to in-memory when not given.
    pub fn new(storage: Option<Arc<dyn StorageAdapter>>) -> Self {
        let storage = storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let feed = ChangeFeed::new();
        let messages = Arc::new(MessageStore::new(storage.clone(), feed.clone()));
        Self {
            directory: ConversationDirectory::new(storage.clone()),
            read_state: ReadStateTracker::new(messages.clone(), feed.clone()),
            profiles: ProfileStore::new(storage),
            messages,
            feed,
            offline: AtomicBool::new(false),
        }
    }

    /// Register (or update) an account's public profile. Stands in for
    /// the out-of-scope auth/profile system; callers unknown here get
    /// `Unauthenticated` from every operation.
    pub fn register_user(&self, profile: &Profile) -> Result<()> {
        self.profiles.upsert(profile)
    }

    /// Simulate backend unavailability: while offline, every operation
    /// fails with `Transient`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Direct feed access, for tests that need to replay or sever
    /// streams.
    pub fn changefeed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transient("backend unreachable".to_string()));
        }
        Ok(())
    }

    fn check_caller(&self, caller: &UserId) -> Result<()> {
        if !self.profiles.exists(caller)? {
            return Err(Error::Unauthenticated);
        }
        Ok(())
    }

    /// Resolve a conversation the caller participates in. A missing row
    /// and a row the caller is not part of are indistinguishable from
    /// the outside.
    fn authorized_conversation(
        &self,
        caller: &UserId,
        id: &ConversationId,
    ) -> Result<Conversation> {
        match self.directory.by_id(id)? {
            Some(conversation) if conversation.involves(caller) => Ok(conversation),
            _ => Err(Error::Forbidden),
        }
    }

    fn notify_lists(&self, conversation: &Conversation) {
        for user in [&conversation.user_lo, &conversation.user_hi] {
            self.feed.publish(
                &Topic::Conversations(user.clone()),
                Change::ConversationTouched(conversation.clone()),
            );
        }
    }
}

impl MessagingBackend for ChatBackend {
    fn get_or_create_conversation(
        &self,
        caller: &UserId,
        other: &UserId,
    ) -> Result<Conversation> {
        self.check_online()?;
        self.check_caller(caller)?;
        if !self.profiles.exists(other)? {
            return Err(Error::InvalidArgument(format!("unknown user: {other}")));
        }

        let (conversation, created) = self.directory.get_or_create(caller, other)?;
        if created {
            self.notify_lists(&conversation);
        }
        Ok(conversation)
    }

    fn append(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> Result<Message> {
        self.check_online()?;
        self.check_caller(sender)?;

        let conversation = self.authorized_conversation(sender, conversation)?;
        let message = self.messages.append(&conversation, sender, body)?;

        // Second, separate write: the message is already committed and
        // fanned out even if this bump fails.
        match self.directory.touch(&conversation.id, message.created_at) {
            Ok(Some(touched)) => self.notify_lists(&touched),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(conversation = %conversation.id, error = %e, "last-activity bump failed");
                self.notify_lists(&conversation);
            }
        }

        Ok(message)
    }

    fn list_since(
        &self,
        caller: &UserId,
        conversation: &ConversationId,
        cursor: Option<u64>,
    ) -> Result<Vec<Message>> {
        self.check_online()?;
        self.check_caller(caller)?;
        self.authorized_conversation(caller, conversation)?;
        self.messages.list_since(conversation, cursor)
    }

    fn mark_read(&self, conversation: &ConversationId, reader: &UserId) -> Result<u64> {
        self.check_online()?;
        self.check_caller(reader)?;
        let conversation = self.authorized_conversation(reader, conversation)?;
        self.read_state.mark_read(&conversation, reader)
    }

    fn unread_count(&self, conversation: &ConversationId, viewer: &UserId) -> Result<u64> {
        self.check_online()?;
        self.check_caller(viewer)?;
        self.authorized_conversation(viewer, conversation)?;
        self.read_state.unread_count(conversation, viewer)
    }

    fn summaries(&self, viewer: &UserId) -> Result<Vec<ConversationSummary>> {
        self.check_online()?;
        self.check_caller(viewer)?;

        let mut out = Vec::new();
        for conversation in self.directory.for_user(viewer)? {
            let counterpart_id = conversation
                .counterpart(viewer)
                .cloned()
                .unwrap_or_else(|| viewer.clone());

            let counterpart = self
                .profiles
                .get(&counterpart_id)?
                .unwrap_or_else(|| Profile::unknown(counterpart_id));

            let last_message = self.messages.last(&conversation.id)?.map(|m| LastMessage {
                body: m.body,
                sender_id: m.sender_id,
                created_at: m.created_at,
            });

            let unread_count = self.read_state.unread_count(&conversation.id, viewer)?;

            out.push(ConversationSummary {
                conversation_id: conversation.id,
                counterpart,
                last_message,
                unread_count,
                last_message_at: conversation.last_message_at,
            });
        }
        Ok(out)
    }

    fn profile(&self, user: &UserId) -> Result<Option<Profile>> {
        self.check_online()?;
        self.profiles.get(user)
    }

    fn subscribe_messages(
        &self,
        caller: &UserId,
        conversation: &ConversationId,
    ) -> Result<Subscription> {
        self.check_online()?;
        self.check_caller(caller)?;
        self.authorized_conversation(caller, conversation)?;
        Ok(self.feed.subscribe(Topic::Messages(conversation.clone())))
    }

    fn subscribe_conversations(&self, user: &UserId) -> Result<Subscription> {
        self.check_online()?;
        self.check_caller(user)?;
        Ok(self.feed.subscribe(Topic::Conversations(user.clone())))
    }
}

impl Default for ChatBackend {
    fn default() -> Self {
        Self::new(None)
    }
}
