/// Errors raised while publishing or consuming mutation events.
#[derive(Debug)]
pub enum EventError {
    /// The broker could not be reached or refused the operation.
    Transport(String),
    /// No queue with this name has been declared.
    UnknownQueue(String),
    /// Ack or nack for a delivery the broker does not hold.
    UnknownDelivery { queue: String, tag: u64 },
    /// An event body could not be encoded or decoded.
    Serialization(serde_json::Error),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::Transport(msg) => write!(f, "Event transport error: {msg}"),
            EventError::UnknownQueue(queue) => write!(f, "Unknown queue: {queue}"),
            EventError::UnknownDelivery { queue, tag } => {
                write!(f, "Unknown delivery {tag} on queue {queue}")
            }
            EventError::Serialization(err) => write!(f, "Event serialization error: {err}"),
        }
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EventError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err)
    }
}
