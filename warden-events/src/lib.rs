//! # warden-events
//!
//! Post-commit mutation events. [`EventPublisher`] puts a [`MutationEvent`]
//! on a durable topic through any [`MessageTransport`]; [`Consumer`] drains a
//! queue bound to that topic with manual acknowledgment. [`InMemoryBroker`]
//! is the in-process transport.

pub mod consumer;
pub mod error;
pub mod event;
pub mod memory;
pub mod publisher;
pub mod settings;
pub mod transport;

pub use consumer::{Consumer, ConsumerStats};
pub use error::EventError;
pub use event::MutationEvent;
pub use memory::{DeadLetter, InMemoryBroker};
pub use publisher::EventPublisher;
pub use settings::EventSettings;
pub use transport::{Delivery, MessageTransport};

pub mod prelude {
    //! Re-exports of the most commonly used event types.
    pub use crate::{Consumer, EventPublisher, InMemoryBroker, MessageTransport, MutationEvent};
}
