use std::sync::Arc;

use crate::error::EventError;
use crate::event::MutationEvent;
use crate::transport::MessageTransport;

/// Publishes [`MutationEvent`]s to a fixed topic.
pub struct EventPublisher<T> {
    transport: Arc<T>,
    topic: String,
}

impl<T> Clone for EventPublisher<T> {
    fn clone(&self) -> Self {
        EventPublisher {
            transport: self.transport.clone(),
            topic: self.topic.clone(),
        }
    }
}

impl<T: MessageTransport> EventPublisher<T> {
    pub fn new(transport: Arc<T>, topic: impl Into<String>) -> Self {
        EventPublisher {
            transport,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub async fn publish(&self, event: &MutationEvent) -> Result<(), EventError> {
        let payload = event.encode()?;
        self.transport.publish(&self.topic, payload).await?;
        tracing::debug!(
            topic = %self.topic,
            event = %event.id,
            tenant = %event.tenant_id,
            resource = %event.resource,
            kind = event.kind.as_str(),
            "mutation event published"
        );
        Ok(())
    }
}
