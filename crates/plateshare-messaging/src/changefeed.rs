use crate::{Conversation, ConversationId, Error, Message, Result, UserId};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scope of one realtime stream: the message log of a single
/// conversation, or everything touching one user's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Messages(ConversationId),
    Conversations(UserId),
}

#[derive(Debug, Clone)]
pub enum Change {
    MessageInserted(Message),
    /// A message row mutated, currently only the read_at transition.
    MessageUpdated(Message),
    ConversationTouched(Conversation),
}

/// In-process change-stream hub. Events published to one topic reach
/// every live subscription of that topic in publish order; nothing is
/// guaranteed across topics. Delivery is at-least-once from the
/// consumer's point of view: a subscriber that also reads the
/// authoritative log can observe the same message twice.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    subscribers: Arc<Mutex<HashMap<Topic, Vec<(String, Sender<Change>)>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = format!("sub-{}", uuid::Uuid::new_v4());
        self.subscribers
            .lock()
            .unwrap()
            .entry(topic.clone())
            .or_default()
            .push((id.clone(), tx));
        Subscription {
            id,
            topic,
            rx,
            feed: self.clone(),
            closed: false,
        }
    }

    /// Fan out under the registry lock, which is what serializes
    /// publishes and gives per-topic ordering.
    pub fn publish(&self, topic: &Topic, change: Change) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(entries) = subscribers.get_mut(topic) {
            entries.retain(|(_, tx)| tx.send(change.clone()).is_ok());
        }
    }

    fn unsubscribe(&self, topic: &Topic, sub_id: &str) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(entries) = subscribers.get_mut(topic) {
            entries.retain(|(id, _)| id != sub_id);
            if entries.is_empty() {
                subscribers.remove(topic);
            }
        }
    }

    /// Sever every subscription on a topic without any notification,
    /// as a dropped transport would. Subscribers find out on their next
    /// read and are expected to resubscribe and re-fetch the log tail.
    pub fn disconnect_topic(&self, topic: &Topic) {
        self.subscribers.lock().unwrap().remove(topic);
    }
}

/// Pull-style handle for one topic subscription.
pub struct Subscription {
    id: String,
    topic: Topic,
    rx: Receiver<Change>,
    feed: ChangeFeed,
    closed: bool,
}

impl Subscription {
    /// Next buffered change, if any. After `close()` this always
    /// returns `Ok(None)`, including for events that were already
    /// buffered when the handle was closed.
    pub fn try_next(&self) -> Result<Option<Change>> {
        if self.closed {
            return Ok(None);
        }
        match self.rx.try_recv() {
            Ok(change) => Ok(Some(change)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::RealtimeDisconnected),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.feed.unsubscribe(&self.topic, &self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConversationId, MessageId, UserId};

    fn message(conv: &ConversationId, body: &str, seq: u64) -> Message {
        Message {
            id: MessageId::generate(),
            conversation_id: conv.clone(),
            sender_id: UserId::new("alice"),
            body: body.to_string(),
            seq,
            created_at: seq,
            read_at: None,
        }
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let feed = ChangeFeed::new();
        let conv = ConversationId::generate();
        let topic = Topic::Messages(conv.clone());
        let sub = feed.subscribe(topic.clone());

        for seq in 1..=3 {
            feed.publish(&topic, Change::MessageInserted(message(&conv, "hi", seq)));
        }

        let mut seqs = Vec::new();
        while let Some(Change::MessageInserted(msg)) = sub.try_next().unwrap() {
            seqs.push(msg.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn topics_are_isolated() {
        let feed = ChangeFeed::new();
        let conv_a = ConversationId::generate();
        let conv_b = ConversationId::generate();
        let sub_a = feed.subscribe(Topic::Messages(conv_a.clone()));

        feed.publish(
            &Topic::Messages(conv_b.clone()),
            Change::MessageInserted(message(&conv_b, "other", 1)),
        );

        assert!(sub_a.try_next().unwrap().is_none());
    }

    #[test]
    fn close_is_idempotent_and_drops_buffered_events() {
        let feed = ChangeFeed::new();
        let conv = ConversationId::generate();
        let topic = Topic::Messages(conv.clone());
        let mut sub = feed.subscribe(topic.clone());

        feed.publish(&topic, Change::MessageInserted(message(&conv, "hi", 1)));
        sub.close();
        sub.close();

        assert!(sub.try_next().unwrap().is_none());
    }

    #[test]
    fn disconnect_surfaces_on_next_read() {
        let feed = ChangeFeed::new();
        let conv = ConversationId::generate();
        let topic = Topic::Messages(conv.clone());
        let sub = feed.subscribe(topic.clone());

        feed.disconnect_topic(&topic);

        assert!(matches!(sub.try_next(), Err(Error::RealtimeDisconnected)));
    }
}
