use std::future::Future;

use bytes::Bytes;

use crate::error::EventError;

/// One message handed to a consumer, held by the broker until acknowledged.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub queue: String,
    /// Broker-assigned handle used to ack or nack this delivery.
    pub tag: u64,
    pub payload: Bytes,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

/// Durable publish/consume contract for mutation events.
///
/// Messages published to a topic are copied to every queue bound to it.
/// A received message stays owned by the broker until it is acked; a nack
/// with `requeue` puts it back for redelivery, subject to the broker's
/// redelivery limit.
pub trait MessageTransport: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Bytes)
        -> impl Future<Output = Result<(), EventError>> + Send;

    /// Declare `queue` (if needed) and route `topic` into it.
    fn bind(&self, queue: &str, topic: &str) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Wait for the next delivery on `queue`.
    fn receive(&self, queue: &str) -> impl Future<Output = Result<Delivery, EventError>> + Send;

    fn ack(&self, delivery: &Delivery) -> impl Future<Output = Result<(), EventError>> + Send;

    fn nack(
        &self,
        delivery: &Delivery,
        requeue: bool,
    ) -> impl Future<Output = Result<(), EventError>> + Send;
}
