use warden_core::WardenError;

/// Errors raised while turning verified claims into a [`Principal`](crate::Principal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// A required claim is absent.
    MissingClaim(&'static str),
    /// A claim is present but unusable (wrong type, bad UUID, ...).
    InvalidClaim { claim: &'static str, reason: String },
    /// The principal's `exp` is in the past.
    Expired,
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityError::MissingClaim(claim) => write!(f, "Missing claim: {claim}"),
            SecurityError::InvalidClaim { claim, reason } => {
                write!(f, "Invalid claim '{claim}': {reason}")
            }
            SecurityError::Expired => write!(f, "Principal expired"),
        }
    }
}

impl std::error::Error for SecurityError {}

impl From<SecurityError> for WardenError {
    fn from(err: SecurityError) -> Self {
        WardenError::Unauthenticated(err.to_string())
    }
}
