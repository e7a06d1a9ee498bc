//! Response header forwarding policy.
//!
//! Decides which upstream response headers reach the client. Functions
//! work on plain data or on `ResponseHeader` values directly, never on
//! the session, so the policy is testable without a running proxy.

use pingora_http::ResponseHeader;

/// Ordered allow-list of response headers copied back to the client.
#[derive(Debug, Clone)]
pub struct ForwardPolicy {
    allowed: Vec<String>,
}

impl ForwardPolicy {
    /// Builds a policy from header names, normalised to lowercase.
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            allowed: headers.into_iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.allowed.iter().any(|h| *h == name)
    }

    /// Names in the policy, in declaration order.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Strips every header not in the allow-list from an upstream
    /// response in place. The status line is left untouched.
    pub fn apply(&self, response: &mut ResponseHeader) {
        let stripped: Vec<http::header::HeaderName> = response
            .headers
            .keys()
            .filter(|name| !self.allows(name.as_str()))
            .cloned()
            .collect();
        for name in stripped {
            response.remove_header(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ForwardPolicy {
        ForwardPolicy::new(vec![
            "date".to_string(),
            "expires".to_string(),
            "content-type".to_string(),
            "content-length".to_string(),
            "cache-control".to_string(),
            "content-disposition".to_string(),
            "content-dpr".to_string(),
        ])
    }

    #[test]
    fn test_allows_is_case_insensitive() {
        let policy = policy();
        assert!(policy.allows("content-type"));
        assert!(policy.allows("Content-Type"));
        assert!(policy.allows("CACHE-CONTROL"));
        assert!(!policy.allows("set-cookie"));
        assert!(!policy.allows("x-amz-request-id"));
    }

    #[test]
    fn test_apply_strips_unlisted_headers() {
        let policy = policy();
        let mut response = ResponseHeader::build(200, None).unwrap();
        response.insert_header("content-type", "image/webp").unwrap();
        response.insert_header("content-length", "1024").unwrap();
        response.insert_header("cache-control", "max-age=31536000").unwrap();
        response.insert_header("server", "imgproxy").unwrap();
        response.insert_header("x-amz-request-id", "abc123").unwrap();
        response.insert_header("set-cookie", "session=1").unwrap();

        policy.apply(&mut response);

        assert_eq!(response.status.as_u16(), 200);
        assert!(response.headers.get("content-type").is_some());
        assert!(response.headers.get("content-length").is_some());
        assert!(response.headers.get("cache-control").is_some());
        assert!(response.headers.get("server").is_none());
        assert!(response.headers.get("x-amz-request-id").is_none());
        assert!(response.headers.get("set-cookie").is_none());
    }

    #[test]
    fn test_apply_keeps_error_response_headers_in_policy() {
        let policy = policy();
        let mut response = ResponseHeader::build(404, None).unwrap();
        response.insert_header("content-type", "text/plain").unwrap();
        response.insert_header("x-error-detail", "no such key").unwrap();

        policy.apply(&mut response);

        assert_eq!(response.status.as_u16(), 404);
        assert!(response.headers.get("content-type").is_some());
        assert!(response.headers.get("x-error-detail").is_none());
    }

    #[test]
    fn test_empty_policy_strips_everything() {
        let policy = ForwardPolicy::new(Vec::new());
        let mut response = ResponseHeader::build(200, None).unwrap();
        response.insert_header("content-type", "image/png").unwrap();

        policy.apply(&mut response);

        assert!(response.headers.get("content-type").is_none());
    }
}
