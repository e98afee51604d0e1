/// Errors raised by cache stores.
#[derive(Debug)]
pub enum CacheError {
    /// The backend could not be reached.
    Unavailable(String),
    /// A cached value could not be encoded or decoded.
    Serialization(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Unavailable(msg) => write!(f, "Cache unavailable: {msg}"),
            CacheError::Serialization(msg) => write!(f, "Cache serialization error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
