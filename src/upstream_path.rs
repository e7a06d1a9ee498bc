//! Upstream path assembly.
//!
//! The transform service addresses source images by path:
//! `/<signature>/<processing>/plain/s3://<bucket>/<key>`. The processing
//! part is the caller-supplied transform token, which this relay treats
//! as opaque and pre-escaped. Two wire conventions exist for inserting
//! it; the convention is fixed at configuration time, never branched per
//! request.

use serde::{Deserialize, Serialize};

use crate::signing::SigningKey;
use crate::source::ObjectReference;

/// How the transform token is placed into the upstream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathAssemblyMode {
    /// Legacy convention: the token is a literal path segment,
    /// `/<token>/plain/s3://<ref>`.
    #[default]
    Segment,
    /// Builder convention: the token travels as a `params:<token>`
    /// modifier, and only when it actually contains a `:` (a bare word
    /// is not a valid modifier value and is dropped).
    Modifier,
}

/// Composes final upstream request paths. Built once from configuration.
#[derive(Debug)]
pub struct PathBuilder {
    mode: PathAssemblyMode,
    signing_key: Option<SigningKey>,
}

impl PathBuilder {
    pub fn new(mode: PathAssemblyMode, signing_key: Option<SigningKey>) -> Self {
        Self { mode, signing_key }
    }

    /// Whether built paths carry a signature segment.
    pub fn is_signed(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Build the upstream path for a validated reference and an opaque
    /// transform token (empty token means no transform).
    ///
    /// The signature segment is prefixed only when a key is configured;
    /// unsigned deployments send the bare candidate. The `s3://` prefix
    /// is the protocol literal the transform service expects,
    /// independent of the actual storage backend.
    pub fn build(&self, reference: &ObjectReference, token: &str) -> String {
        let candidate = self.unsigned_candidate(reference, token);

        match &self.signing_key {
            Some(key) => format!("/{}{}", key.sign(&candidate), candidate),
            None => candidate,
        }
    }

    fn unsigned_candidate(&self, reference: &ObjectReference, token: &str) -> String {
        let transform_segment = match self.mode {
            PathAssemblyMode::Segment if !token.is_empty() => format!("/{}", token),
            PathAssemblyMode::Modifier if token.contains(':') => format!("/params:{}", token),
            _ => String::new(),
        };

        format!("{}/plain/s3://{}", transform_segment, reference.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceValidator;

    fn reference(src: &str) -> ObjectReference {
        SourceValidator::new(None).validate(src).unwrap()
    }

    fn signed_builder(mode: PathAssemblyMode) -> PathBuilder {
        let key = SigningKey::from_hex("736563726574", "68656c6c6f").unwrap();
        PathBuilder::new(mode, Some(key))
    }

    #[test]
    fn test_plain_path_without_token() {
        let builder = PathBuilder::new(PathAssemblyMode::Segment, None);
        assert_eq!(
            builder.build(&reference("bucket/img.png"), ""),
            "/plain/s3://bucket/img.png"
        );
    }

    #[test]
    fn test_segment_mode_inserts_token_literally() {
        let builder = PathBuilder::new(PathAssemblyMode::Segment, None);
        assert_eq!(
            builder.build(&reference("bucket/img.png"), "t"),
            "/t/plain/s3://bucket/img.png"
        );
    }

    #[test]
    fn test_segment_mode_with_realistic_token() {
        let builder = PathBuilder::new(PathAssemblyMode::Segment, None);
        assert_eq!(
            builder.build(&reference("bucket/img.png"), "rs:fill:300:200/bl:5"),
            "/rs:fill:300:200/bl:5/plain/s3://bucket/img.png"
        );
    }

    #[test]
    fn test_modifier_mode_wraps_token() {
        let builder = PathBuilder::new(PathAssemblyMode::Modifier, None);
        assert_eq!(
            builder.build(&reference("bucket/img.png"), "rs:fill:300:200"),
            "/params:rs:fill:300:200/plain/s3://bucket/img.png"
        );
    }

    #[test]
    fn test_modifier_mode_drops_token_without_colon() {
        let builder = PathBuilder::new(PathAssemblyMode::Modifier, None);
        assert_eq!(
            builder.build(&reference("bucket/img.png"), "bare"),
            "/plain/s3://bucket/img.png"
        );
    }

    #[test]
    fn test_signed_path_prefixes_signature_of_candidate() {
        let builder = signed_builder(PathAssemblyMode::Segment);
        let key = SigningKey::from_hex("736563726574", "68656c6c6f").unwrap();

        let path = builder.build(&reference("bucket/img.png"), "t");
        let candidate = "/t/plain/s3://bucket/img.png";

        assert_eq!(path, format!("/{}{}", key.sign(candidate), candidate));
    }

    #[test]
    fn test_signed_path_first_segment_is_signature() {
        let builder = signed_builder(PathAssemblyMode::Segment);
        let path = builder.build(&reference("bucket/img.png"), "");

        let mut segments = path.splitn(3, '/');
        assert_eq!(segments.next(), Some("")); // leading slash
        let signature = segments.next().unwrap();
        assert_eq!(signature.len(), 43);
        assert_eq!(segments.next(), Some("plain/s3://bucket/img.png"));
    }

    #[test]
    fn test_default_mode_is_segment() {
        assert_eq!(PathAssemblyMode::default(), PathAssemblyMode::Segment);
    }
}
