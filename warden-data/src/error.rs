use std::time::Duration;

use warden_core::WardenError;

/// Errors raised by the data layer and the tenant context manager.
#[derive(Debug)]
pub enum DataError {
    NotFound(String),
    Database(Box<dyn std::error::Error + Send + Sync>),
    /// The transaction could not be opened or the tenant directive could not
    /// be set. The unit of work never ran.
    IsolationSetup(String),
    /// A write was rejected by the row-security policy.
    PolicyViolation(String),
    /// The unit of work exceeded its time budget and was rolled back.
    Timeout(Duration),
    Other(String),
}

impl DataError {
    /// Wrap any driver-specific error.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub fn isolation(context: &str, err: impl std::fmt::Display) -> Self {
        DataError::IsolationSetup(format!("{context}: {err}"))
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::IsolationSetup(msg) => write!(f, "Isolation setup failed: {msg}"),
            DataError::PolicyViolation(msg) => write!(f, "Row security violation: {msg}"),
            DataError::Timeout(limit) => write!(f, "Unit of work exceeded {}ms", limit.as_millis()),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<DataError> for WardenError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound(msg) => WardenError::NotFound(msg),
            DataError::IsolationSetup(msg) => WardenError::IsolationSetupFailed(msg),
            other => WardenError::Storage(other.to_string()),
        }
    }
}

/// Extension trait for converting `sqlx::Error` into [`DataError`].
///
/// `From<sqlx::Error>` would leak the driver into every signature of the
/// crate; the explicit `.into_data_error()` keeps the seam visible.
#[cfg(feature = "postgres")]
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

#[cfg(feature = "postgres")]
impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        if let sqlx::Error::RowNotFound = self {
            return DataError::NotFound("Row not found".into());
        }
        // 42501: insufficient_privilege, raised by WITH CHECK policy failures.
        let code = self
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        match code.as_deref() {
            Some("42501") => DataError::PolicyViolation(self.to_string()),
            _ => DataError::database(self),
        }
    }
}

/// Convenience alias for data-layer results.
pub type DataResult<T> = Result<T, DataError>;
