// Per-request state carried through the proxy hooks

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Context that travels with a request from the downstream filter to the
/// access log. Created once per request; the proxy hooks fill in the
/// relay outcome as it becomes known.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    method: String,
    path: String,
    timestamp: u64,
    started: Instant,
    /// Bucket the request resolved to, once validation succeeded.
    source_bucket: Option<String>,
    /// Path sent upstream, once assembled.
    upstream_path: Option<String>,
    /// Status answered locally without contacting the upstream, if any.
    rejected_with: Option<u16>,
}

impl RequestContext {
    pub fn new(method: String, path: String) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            path,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            started: Instant::now(),
            source_bucket: None,
            upstream_path: None,
            rejected_with: None,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Unix epoch seconds at which the request arrived.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn set_source_bucket(&mut self, bucket: String) {
        self.source_bucket = Some(bucket);
    }

    pub fn source_bucket(&self) -> Option<&str> {
        self.source_bucket.as_deref()
    }

    pub fn set_upstream_path(&mut self, path: String) {
        self.upstream_path = Some(path);
    }

    pub fn upstream_path(&self) -> Option<&str> {
        self.upstream_path.as_deref()
    }

    /// Record that the request was answered locally with `status`.
    pub fn set_rejected(&mut self, status: u16) {
        self.rejected_with = Some(status);
    }

    pub fn rejected_with(&self) -> Option<u16> {
        self.rejected_with
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_new() {
        let ctx = RequestContext::new("GET".to_string(), "/_next/imgproxy".to_string());
        assert_eq!(ctx.method(), "GET");
        assert_eq!(ctx.path(), "/_next/imgproxy");
        assert!(ctx.source_bucket().is_none());
        assert!(ctx.upstream_path().is_none());
        assert!(ctx.rejected_with().is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new("GET".to_string(), "/a".to_string());
        let b = RequestContext::new("GET".to_string(), "/a".to_string());
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_relay_outcome_is_recorded() {
        let mut ctx = RequestContext::new("GET".to_string(), "/_next/imgproxy".to_string());
        ctx.set_source_bucket("assets".to_string());
        ctx.set_upstream_path("/sig/t/plain/s3://assets/a.png".to_string());
        assert_eq!(ctx.source_bucket(), Some("assets"));
        assert_eq!(ctx.upstream_path(), Some("/sig/t/plain/s3://assets/a.png"));

        ctx.set_rejected(400);
        assert_eq!(ctx.rejected_with(), Some(400));
    }
}
