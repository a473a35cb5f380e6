//! In-process keyed broker
//!
//! Each topic keeps one FIFO queue per key plus a ready list of keys whose
//! head message may be handed out. A key leaves the ready list while its
//! head is in flight, so at most one message per key is outstanding.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{Acknowledger, ChannelError, Delivery, Message, Publisher, Subscriber, Subscription};

#[derive(Default)]
struct TopicState {
    queues: HashMap<String, VecDeque<Message>>,
    ready: VecDeque<String>,
    in_flight: HashSet<String>,
    next_offset: u64,
}

struct Topic {
    name: String,
    state: Mutex<TopicState>,
    changed: Notify,
}

impl Topic {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(TopicState::default()),
            changed: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, TopicState> {
        self.state.lock()
    }

    fn push(&self, key: &str, payload: Vec<u8>) -> u64 {
        let mut state = self.state();
        let offset = state.next_offset;
        state.next_offset += 1;

        let queue = state.queues.entry(key.to_string()).or_default();
        let was_idle = queue.is_empty();
        queue.push_back(Message {
            topic: self.name.clone(),
            key: key.to_string(),
            payload,
            offset,
            attempt: 0,
        });

        if was_idle && !state.in_flight.contains(key) {
            state.ready.push_back(key.to_string());
        }
        drop(state);

        self.changed.notify_waiters();
        offset
    }

    fn take(&self) -> Option<Message> {
        let mut state = self.state();
        while let Some(key) = state.ready.pop_front() {
            let Some(head) = state.queues.get_mut(&key).and_then(|q| q.front_mut()) else {
                continue;
            };
            head.attempt += 1;
            let message = head.clone();
            state.in_flight.insert(key);
            return Some(message);
        }
        None
    }

    fn settle(&self, message: &Message, committed: bool) {
        let mut state = self.state();
        if !state.in_flight.remove(&message.key) {
            return;
        }

        let key = message.key.clone();
        if committed {
            let queue = state.queues.entry(key.clone()).or_default();
            if queue.front().map(|m| m.offset) == Some(message.offset) {
                queue.pop_front();
            }
            if queue.is_empty() {
                state.queues.remove(&key);
            } else {
                state.ready.push_back(key);
            }
        } else {
            // Redeliver before anything else waiting on this topic
            state.ready.push_front(key);
        }
        drop(state);

        self.changed.notify_waiters();
    }

    fn depth(&self) -> usize {
        self.state().queues.values().map(VecDeque::len).sum()
    }
}

struct TopicAcker(Weak<Topic>);

impl Acknowledger for TopicAcker {
    fn ack(&self, message: &Message) {
        if let Some(topic) = self.0.upgrade() {
            trace!(topic = %message.topic, offset = message.offset, "ack");
            topic.settle(message, true);
        }
    }

    fn nack(&self, message: &Message) {
        if let Some(topic) = self.0.upgrade() {
            debug!(
                topic = %message.topic,
                key = %message.key,
                offset = message.offset,
                attempt = message.attempt,
                "message nacked, scheduling redelivery"
            );
            topic.settle(message, false);
        }
    }
}

/// Keyed at-least-once broker living in process memory
///
/// Subscriptions to the same topic compete for messages, like members of
/// one consumer group.
#[derive(Default)]
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock();
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Topic::new(name))),
        )
    }

    /// Messages not yet acknowledged on `topic`, in flight included
    pub fn depth(&self, topic: &str) -> usize {
        self.topic(topic).depth()
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<u64, ChannelError> {
        let offset = self.topic(topic).push(key, payload);
        trace!(topic, key, offset, "published");
        Ok(offset)
    }
}

impl Subscriber for InMemoryBroker {
    fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, ChannelError> {
        let topic = self.topic(topic);
        let acker: Arc<dyn Acknowledger> = Arc::new(TopicAcker(Arc::downgrade(&topic)));
        Ok(Box::new(MemorySubscription { topic, acker }))
    }
}

struct MemorySubscription {
    topic: Arc<Topic>,
    acker: Arc<dyn Acknowledger>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn fetch(&mut self) -> Result<Delivery, ChannelError> {
        loop {
            let changed = self.topic.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(message) = self.topic.take() {
                return Ok(Delivery::new(message, Arc::clone(&self.acker)));
            }
            changed.await;
        }
    }
}
