//! Source reference validation.
//!
//! An inbound `src` parameter names an object as `<bucket>/<key>`. The
//! bucket segment may not contain `/` or `.` (dots would allow host-style
//! smuggling into the upstream path) and the key must be non-empty and
//! must not end in `/`. Anything else is rejected outright; there is no
//! partial acceptance or normalization.

use std::collections::HashSet;

use regex::Regex;

use crate::error::RelayError;

/// Grammar for a valid source reference: a bucket without `/` or `.`,
/// then `/`, then a non-empty key not ending in `/`.
pub const SRC_PATTERN: &str = r"^[^/.]+/.+[^/]$";

/// A validated `bucket/key` reference into backing storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    raw: String,
    bucket_len: usize,
}

impl ObjectReference {
    /// The bucket (namespace) segment, everything before the first `/`.
    pub fn bucket(&self) -> &str {
        &self.raw[..self.bucket_len]
    }

    /// The full `bucket/key` string as supplied by the caller.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Validates source references against the grammar and the optional
/// bucket whitelist. Built once from configuration; the grammar regex is
/// compiled at construction, never per request.
#[derive(Debug)]
pub struct SourceValidator {
    pattern: Regex,
    whitelist: Option<HashSet<String>>,
}

impl SourceValidator {
    pub fn new(whitelist: Option<Vec<String>>) -> Self {
        let whitelist = whitelist
            .filter(|list| !list.is_empty())
            .map(|list| list.into_iter().collect());

        Self {
            // The pattern is a compile-time constant; it cannot fail to parse.
            pattern: Regex::new(SRC_PATTERN).expect("source grammar is valid"),
            whitelist,
        }
    }

    /// Validate a raw `src` value.
    ///
    /// Returns `InvalidSource` when the grammar fails and
    /// `ForbiddenBucket` when a whitelist is configured and the bucket is
    /// not a member. No side effects on rejection.
    pub fn validate(&self, src: &str) -> Result<ObjectReference, RelayError> {
        if !self.pattern.is_match(src) {
            return Err(RelayError::InvalidSource(src.to_string()));
        }

        // The grammar guarantees a '/' exists past a non-empty bucket.
        let bucket_len = src.find('/').unwrap_or(src.len());
        let bucket = &src[..bucket_len];

        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(bucket) {
                return Err(RelayError::ForbiddenBucket(bucket.to_string()));
            }
        }

        Ok(ObjectReference {
            raw: src.to_string(),
            bucket_len,
        })
    }
}
