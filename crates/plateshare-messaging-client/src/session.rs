use plateshare_messaging::{
    Change, Conversation, ConversationId, Error, Message, MessageId, MessagingBackend, Result,
    Subscription, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Resolving,
    Ready,
    Closed,
}

/// One open chat with one counterpart: resolves the conversation,
/// subscribes to its realtime stream, loads history, and keeps the
/// local list deduplicated and ordered no matter which path a message
/// arrived by.
///
/// The local list invariant: id-unique, ascending `(created_at, seq)`,
/// whether a row came from the initial load, a push event, or a
/// post-reconnect reconciliation.
pub struct ChatSession {
    backend: Arc<dyn MessagingBackend>,
    me: UserId,
    counterpart: UserId,
    conversation: Conversation,
    phase: SessionPhase,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    subscription: Option<Subscription>,
    send_in_flight: bool,
}

impl ChatSession {
    /// Resolve (or create) the conversation with `counterpart`,
    /// subscribe, and load history. Subscribing *before* the initial
    /// load means a message committed in between shows up on both
    /// paths rather than on neither; the seen-id set collapses the
    /// duplicate.
    pub fn open(
        backend: Arc<dyn MessagingBackend>,
        me: UserId,
        counterpart: UserId,
    ) -> Result<Self> {
        let conversation = backend.get_or_create_conversation(&me, &counterpart)?;
        let subscription = backend.subscribe_messages(&me, &conversation.id)?;
        let history = backend.list_since(&me, &conversation.id, None)?;

        let mut session = Self {
            backend,
            me,
            counterpart,
            conversation,
            phase: SessionPhase::Resolving,
            messages: Vec::new(),
            seen: HashSet::new(),
            subscription: Some(subscription),
            send_in_flight: false,
        };
        for message in history {
            session.merge(message);
        }
        session.phase = SessionPhase::Ready;

        // The viewer is looking at the conversation now; never block
        // the session on this.
        session.mark_read_best_effort();

        Ok(session)
    }

    /// Submit a message. Trims first; whitespace-only input is
    /// rejected before anything leaves the client. No automatic retry:
    /// on failure the caller keeps the text and decides.
    pub fn send(&mut self, text: &str) -> Result<Message> {
        if self.phase == SessionPhase::Closed {
            return Err(Error::InvalidArgument("session is closed".to_string()));
        }
        if self.send_in_flight {
            return Err(Error::InvalidArgument(
                "a send is already in flight".to_string(),
            ));
        }

        let body = text.trim();
        if body.is_empty() {
            return Err(Error::InvalidArgument("message body is empty".to_string()));
        }

        self.send_in_flight = true;
        let result = self.backend.append(&self.conversation.id, &self.me, body);
        self.send_in_flight = false;

        let message = result?;
        // Show our own message immediately; the echoed push event will
        // dedupe against it.
        self.merge(message.clone());
        Ok(message)
    }

    /// Drain pending realtime events into the local list. Returns how
    /// many rows were inserted or updated. A dropped feed is handled
    /// here: resubscribe, then re-fetch the authoritative log to fill
    /// whatever the dead subscription missed.
    pub fn pump(&mut self) -> Result<usize> {
        if self.phase == SessionPhase::Closed {
            return Ok(0);
        }

        if self.subscription.is_none() {
            return self.reconnect();
        }

        let mut applied = 0;
        let mut counterpart_arrival = false;

        loop {
            let next = match self.subscription.as_ref() {
                Some(sub) => sub.try_next(),
                None => break,
            };
            match next {
                Ok(Some(Change::MessageInserted(message))) => {
                    if self.merge(message.clone()) {
                        applied += 1;
                        if message.sender_id != self.me {
                            counterpart_arrival = true;
                        }
                    }
                }
                Ok(Some(Change::MessageUpdated(message))) => {
                    if self.apply_update(message) {
                        applied += 1;
                    }
                }
                Ok(Some(Change::ConversationTouched(_))) => {}
                Ok(None) => break,
                Err(Error::RealtimeDisconnected) => {
                    tracing::debug!(conversation = %self.conversation.id, "feed dropped, reconciling");
                    self.subscription = None;
                    applied += self.reconnect()?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        // The window is open, so newly arrived counterpart messages
        // are read the moment we render them.
        if counterpart_arrival {
            self.mark_read_best_effort();
        }

        Ok(applied)
    }

    /// Tear down. Safe to call repeatedly; after this no event can
    /// change local state.
    pub fn close(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.close();
        }
        self.phase = SessionPhase::Closed;
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation.id
    }

    pub fn counterpart(&self) -> &UserId {
        &self.counterpart
    }

    /// The deduplicated, ordered local view.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Resubscribe and reconcile against the full log. The push stream
    /// alone cannot be trusted across a disconnect: no buffered events
    /// are guaranteed on reconnect.
    fn reconnect(&mut self) -> Result<usize> {
        let subscription = self
            .backend
            .subscribe_messages(&self.me, &self.conversation.id)?;
        self.subscription = Some(subscription);

        let mut applied = 0;
        for message in self.backend.list_since(&self.me, &self.conversation.id, None)? {
            if self.merge(message.clone()) {
                applied += 1;
            } else if self.apply_update(message) {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn mark_read_best_effort(&self) {
        if let Err(e) = self.backend.mark_read(&self.conversation.id, &self.me) {
            tracing::warn!(conversation = %self.conversation.id, error = %e, "mark-read failed");
        }
    }

    /// Insert if unseen, keeping the list ordered. Returns whether the
    /// message was new.
    fn merge(&mut self, message: Message) -> bool {
        if self.seen.contains(&message.id) {
            return false;
        }
        self.seen.insert(message.id.clone());

        let key = (message.created_at, message.seq);
        let at = self
            .messages
            .partition_point(|m| (m.created_at, m.seq) <= key);
        self.messages.insert(at, message);
        true
    }

    /// Apply a row mutation (read receipt) to an already-visible
    /// message. Updates for unknown ids are dropped; the reconcile
    /// path will pick the row up whole.
    fn apply_update(&mut self, message: Message) -> bool {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            if existing.read_at != message.read_at {
                existing.read_at = message.read_at;
                return true;
            }
        }
        false
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}
