use thiserror::Error;

/// Error taxonomy for the routing core.
///
/// Every variant maps to exactly one HTTP status at the service boundary;
/// `kind()` is the stable machine-readable tag used in error envelopes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Payload failed validation at the HTTP boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// All three pincode resolution strategies failed.
    #[error("pincode {0} could not be resolved")]
    CodeNotFound(String),

    /// External geocoder timed out or errored. Never surfaced to callers:
    /// the resolver falls through to the local strategies and only logs it.
    #[error("geocoder unavailable: {0}")]
    GeocoderUnavailable(String),

    /// Facility store query failed.
    #[error("facility store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A facility store query exceeded its per-call timeout.
    #[error("facility store query timed out")]
    StoreTimeout,

    /// The overall request deadline elapsed.
    #[error("request deadline exceeded")]
    Deadline,

    /// Connection pool saturated; transient.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Stable tag for the `{error, message}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "InvalidInput",
            ServiceError::CodeNotFound(_) => "CodeNotFound",
            ServiceError::GeocoderUnavailable(_) => "GeocoderUnavailable",
            ServiceError::Store(_) | ServiceError::StoreTimeout => "StoreError",
            ServiceError::Deadline => "Deadline",
            ServiceError::Unavailable(_) => "ServiceUnavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ServiceError::InvalidInput("x".into()).kind(), "InvalidInput");
        assert_eq!(ServiceError::CodeNotFound("000000".into()).kind(), "CodeNotFound");
        assert_eq!(ServiceError::StoreTimeout.kind(), "StoreError");
        assert_eq!(ServiceError::Deadline.kind(), "Deadline");
        assert_eq!(ServiceError::Unavailable("pool".into()).kind(), "ServiceUnavailable");
    }
}
