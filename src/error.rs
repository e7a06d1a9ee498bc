// Error types module

use thiserror::Error;

/// Centralized error type for the relay
///
/// Categorizes failures so the boundary can map each one to the
/// correct HTTP status code. Upstream HTTP statuses are not errors;
/// they are forwarded to the caller verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The `src` query parameter is missing, duplicated, or fails the
    /// `bucket/key` grammar
    #[error("invalid source reference: {0}")]
    InvalidSource(String),

    /// The bucket is not in the configured whitelist
    #[error("bucket '{0}' is not whitelisted")]
    ForbiddenBucket(String),

    /// Transport-level failure talking to the transform service
    /// (connect refused, reset, timeout)
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Configuration errors (invalid YAML, missing env vars, bad hex
    /// credentials, malformed base URL)
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// HTTP status code this error maps to at the relay boundary.
    ///
    /// Validation failures are client errors; transport failures are
    /// synthesized 500s. `Config` never reaches a request path (it is
    /// startup-fatal) but maps to 500 for completeness.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidSource(_) | RelayError::ForbiddenBucket(_) => 400,
            RelayError::UpstreamTransport(_) | RelayError::Config(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_source_maps_to_400() {
        assert_eq!(RelayError::InvalidSource("bad".into()).status_code(), 400);
    }

    #[test]
    fn test_forbidden_bucket_maps_to_400() {
        assert_eq!(RelayError::ForbiddenBucket("b".into()).status_code(), 400);
    }

    #[test]
    fn test_transport_error_maps_to_500() {
        assert_eq!(
            RelayError::UpstreamTransport("connection refused".into()).status_code(),
            500
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RelayError::ForbiddenBucket("private".into());
        assert!(err.to_string().contains("private"));
    }
}
