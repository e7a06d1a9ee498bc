//! Relay decision pipeline.
//!
//! Combines query parsing, source validation and upstream path assembly
//! into one pure step. The proxy hooks only act on the returned
//! decision, which keeps the whole request policy testable without a
//! session.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::proxy::query::parse_transform_request;
use crate::signing::SigningKey;
use crate::source::SourceValidator;
use crate::upstream_path::PathBuilder;

/// What the proxy should do with a downstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    /// Answer locally with `status` and an empty body.
    Reject { status: u16, reason: String },
    /// Proxy to the upstream at `upstream_path`.
    Forward {
        upstream_path: String,
        bucket: String,
    },
}

/// Everything needed to turn a request line into a [`RelayDecision`].
pub struct RelayPipeline {
    endpoint_path: String,
    validator: SourceValidator,
    builder: PathBuilder,
}

impl RelayPipeline {
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let signing_key = match &config.signature {
            Some(signature) => Some(SigningKey::from_hex(&signature.key, &signature.salt)?),
            None => None,
        };
        Ok(Self {
            endpoint_path: config.endpoint_path.clone(),
            validator: SourceValidator::new(config.bucket_whitelist.clone()),
            builder: PathBuilder::new(config.path_mode, signing_key),
        })
    }

    pub fn endpoint_path(&self) -> &str {
        &self.endpoint_path
    }

    /// Decides the fate of a request to `path` with raw query `query`.
    pub fn evaluate(&self, path: &str, query: Option<&str>) -> RelayDecision {
        if path != self.endpoint_path {
            return RelayDecision::Reject {
                status: 404,
                reason: format!("no handler for {}", path),
            };
        }

        let request = match parse_transform_request(query) {
            Ok(request) => request,
            Err(e) => {
                return RelayDecision::Reject {
                    status: e.status_code(),
                    reason: e.to_string(),
                }
            }
        };

        let reference = match self.validator.validate(&request.src) {
            Ok(reference) => reference,
            Err(e) => {
                return RelayDecision::Reject {
                    status: e.status_code(),
                    reason: e.to_string(),
                }
            }
        };

        RelayDecision::Forward {
            bucket: reference.bucket().to_string(),
            upstream_path: self.builder.build(&reference, &request.token),
        }
    }
}
