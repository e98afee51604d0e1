use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::EventError;
use crate::event::MutationEvent;
use crate::transport::{Delivery, MessageTransport};

/// Counts reported by [`Consumer::run`] when it stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acked: u64,
    pub nacked: u64,
    pub rejected: u64,
}

/// Pulls [`MutationEvent`]s from one queue and hands them to a handler.
pub struct Consumer<T> {
    transport: Arc<T>,
    queue: String,
}

impl<T: MessageTransport> Consumer<T> {
    pub fn new(transport: Arc<T>, queue: impl Into<String>) -> Self {
        Consumer {
            transport,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Consume until `shutdown` is cancelled.
    ///
    /// Handler success acks the delivery, handler failure nacks it for
    /// redelivery. A body that does not decode is nacked without requeue so
    /// it goes straight to dead letters. Transport errors stop the loop.
    pub async fn run<F, Fut, E>(
        &self,
        shutdown: CancellationToken,
        handler: F,
    ) -> Result<ConsumerStats, EventError>
    where
        F: Fn(MutationEvent) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display,
    {
        tracing::info!(queue = %self.queue, "consumer started");
        let mut stats = ConsumerStats::default();

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = self.transport.receive(&self.queue) => delivery?,
            };
            self.handle(&delivery, &handler, &mut stats).await?;
        }

        tracing::info!(
            queue = %self.queue,
            acked = stats.acked,
            nacked = stats.nacked,
            rejected = stats.rejected,
            "consumer stopped"
        );
        Ok(stats)
    }

    async fn handle<F, Fut, E>(
        &self,
        delivery: &Delivery,
        handler: &F,
        stats: &mut ConsumerStats,
    ) -> Result<(), EventError>
    where
        F: Fn(MutationEvent) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), E>> + Send,
        E: Display,
    {
        let event = match MutationEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(queue = %self.queue, tag = delivery.tag, error = %err, "undecodable event rejected");
                stats.rejected += 1;
                return self.transport.nack(delivery, false).await;
            }
        };

        let event_id = event.id;
        match handler(event).await {
            Ok(()) => {
                stats.acked += 1;
                self.transport.ack(delivery).await
            }
            Err(err) => {
                tracing::warn!(
                    queue = %self.queue,
                    event = %event_id,
                    attempt = delivery.attempt,
                    error = %err,
                    "event handler failed, requeueing"
                );
                stats.nacked += 1;
                self.transport.nack(delivery, true).await
            }
        }
    }
}
