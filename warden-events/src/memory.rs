//! In-process broker with durable-queue semantics.
//!
//! Used by tests and single-node deployments. Queues keep messages until
//! they are acked, redeliver on nack and move a message to the dead-letter
//! list once it has used up its redeliveries.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::EventError;
use crate::transport::{Delivery, MessageTransport};

/// Redeliveries allowed before a message is dead-lettered.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// A message that exhausted its redeliveries or was rejected without requeue.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub queue: String,
    pub payload: Bytes,
    pub attempts: u32,
}

#[derive(Clone)]
struct Message {
    payload: Bytes,
    deliveries: u32,
}

#[derive(Default)]
struct Queue {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
}

#[derive(Default)]
struct BrokerState {
    bindings: HashMap<String, Vec<String>>,
    queues: HashMap<String, Queue>,
    dead_letters: Vec<DeadLetter>,
    next_tag: u64,
}

struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    max_redeliveries: u32,
    unavailable: AtomicBool,
}

/// Topic/queue broker held in memory. `Clone` shares the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_max_redeliveries(DEFAULT_MAX_REDELIVERIES)
    }

    /// A message is delivered at most `1 + max_redeliveries` times.
    pub fn with_max_redeliveries(max_redeliveries: u32) -> Self {
        InMemoryBroker {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                max_redeliveries,
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    pub fn max_redeliveries(&self) -> u32 {
        self.inner.max_redeliveries
    }

    /// Make `publish` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages waiting to be delivered on `queue`.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Messages delivered on `queue` and not yet acked or nacked.
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, |q| q.unacked.len())
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead_letters.clone()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_take(&self, queue: &str) -> Result<Option<Delivery>, EventError> {
        let mut state = self.state();
        state.next_tag += 1;
        let tag = state.next_tag;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| EventError::UnknownQueue(queue.to_string()))?;
        let Some(mut message) = q.ready.pop_front() else {
            return Ok(None);
        };
        message.deliveries += 1;
        let delivery = Delivery {
            queue: queue.to_string(),
            tag,
            payload: message.payload.clone(),
            attempt: message.deliveries,
        };
        q.unacked.insert(tag, message);
        Ok(Some(delivery))
    }

    fn settle(&self, delivery: &Delivery) -> Result<(MutexGuard<'_, BrokerState>, Message), EventError> {
        let mut state = self.state();
        let message = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| EventError::UnknownQueue(delivery.queue.clone()))?
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| EventError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            })?;
        Ok((state, message))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), EventError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(EventError::Transport("broker unavailable".into()));
        }
        let mut state = self.state();
        let targets = state.bindings.get(topic).cloned().unwrap_or_default();
        if targets.is_empty() {
            tracing::debug!(topic, "no queue bound to topic, message dropped");
            return Ok(());
        }
        for name in &targets {
            state.queues.entry(name.clone()).or_default().ready.push_back(Message {
                payload: payload.clone(),
                deliveries: 0,
            });
        }
        drop(state);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn bind(&self, queue: &str, topic: &str) -> Result<(), EventError> {
        let mut state = self.state();
        state.queues.entry(queue.to_string()).or_default();
        let bound = state.bindings.entry(topic.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery, EventError> {
        loop {
            // Registered before checking so a publish in between still wakes us.
            let notified = self.inner.notify.notified();
            if let Some(delivery) = self.try_take(queue)? {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), EventError> {
        self.settle(delivery).map(|_| ())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), EventError> {
        let (mut state, message) = self.settle(delivery)?;
        if requeue && message.deliveries <= self.inner.max_redeliveries {
            if let Some(q) = state.queues.get_mut(&delivery.queue) {
                q.ready.push_back(message);
            }
            drop(state);
            self.inner.notify.notify_waiters();
            return Ok(());
        }

        tracing::warn!(
            queue = %delivery.queue,
            attempts = message.deliveries,
            "message moved to dead letters"
        );
        state.dead_letters.push(DeadLetter {
            queue: delivery.queue.clone(),
            payload: message.payload,
            attempts: message.deliveries,
        });
        Ok(())
    }
}
