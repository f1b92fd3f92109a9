use plateshare_messaging::{
    ConversationSummary, Error, MessagingBackend, Result, Subscription, UserId,
};
use std::sync::Arc;

/// Push-refreshed conversation list for one viewer. Holds the latest
/// server-side summaries (counterpart profile, last message, unread
/// count) ordered by most recent activity, and refetches whenever the
/// viewer's conversation topic signals.
///
/// A full refetch per signal keeps ordering correct without assuming
/// any cross-conversation ordering of the multiplexed stream.
pub struct ConversationList {
    backend: Arc<dyn MessagingBackend>,
    viewer: UserId,
    summaries: Vec<ConversationSummary>,
    subscription: Option<Subscription>,
    closed: bool,
}

impl ConversationList {
    pub fn open(backend: Arc<dyn MessagingBackend>, viewer: UserId) -> Result<Self> {
        let subscription = backend.subscribe_conversations(&viewer)?;
        let mut list = Self {
            backend,
            viewer,
            summaries: Vec::new(),
            subscription: Some(subscription),
            closed: false,
        };
        list.refresh()?;
        Ok(list)
    }

    /// Recompute from the backend aggregate.
    pub fn refresh(&mut self) -> Result<()> {
        self.summaries = self.backend.summaries(&self.viewer)?;
        Ok(())
    }

    /// Drain pending signals; refresh at most once no matter how many
    /// arrived. A dropped feed resubscribes and refreshes; list state
    /// is cheap to rebuild, so no reconciliation protocol is needed.
    /// Returns whether the summaries were refetched.
    pub fn pump(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }

        if self.subscription.is_none() {
            self.resubscribe()?;
            return Ok(true);
        }

        let mut dirty = false;
        loop {
            let next = match self.subscription.as_ref() {
                Some(sub) => sub.try_next(),
                None => break,
            };
            match next {
                Ok(Some(_)) => dirty = true,
                Ok(None) => break,
                Err(Error::RealtimeDisconnected) => {
                    tracing::debug!(viewer = %self.viewer, "conversation feed dropped");
                    self.subscription = None;
                    self.resubscribe()?;
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
        }

        if dirty {
            self.refresh()?;
        }
        Ok(dirty)
    }

    pub fn close(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.close();
        }
        self.closed = true;
    }

    /// Most recent activity first.
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn total_unread(&self) -> u64 {
        self.summaries.iter().map(|s| s.unread_count).sum()
    }

    fn resubscribe(&mut self) -> Result<()> {
        self.subscription = Some(self.backend.subscribe_conversations(&self.viewer)?);
        self.refresh()
    }
}

impl Drop for ConversationList {
    fn drop(&mut self) {
        self.close();
    }
}
