// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RelayError;
use crate::upstream_path::PathAssemblyMode;

/// Default inbound endpoint path, matching the URL shape the image
/// component produces.
pub const DEFAULT_ENDPOINT_PATH: &str = "/_next/imgproxy";

/// Default response header allow-list. The longer known variant
/// (including `content-dpr`) is canonical; override per deployment with
/// `forwarded_headers`.
pub const DEFAULT_FORWARDED_HEADERS: &[&str] = &[
    "date",
    "expires",
    "content-type",
    "content-length",
    "cache-control",
    "content-disposition",
    "content-dpr",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    /// Inbound path served by the relay; everything else is a 404.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Hex-encoded signing credential. Absent means unsigned paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureConfig>,
    /// Allowed source buckets. Absent or empty means all buckets pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_whitelist: Option<Vec<String>>,
    /// Overrides the default response header allow-list, in order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded_headers: Option<Vec<String>>,
    /// How the transform token is placed into the upstream path.
    #[serde(default)]
    pub path_mode: PathAssemblyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the transform service, e.g. "http://imgproxy:8080".
    pub base_url: String,
    /// Bearer token attached to every outbound request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Connect/read/write timeout in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Hex-encoded HMAC key.
    pub key: String,
    /// Hex-encoded salt, hashed in before the path.
    pub salt: String,
}

fn default_endpoint_path() -> String {
    DEFAULT_ENDPOINT_PATH.to_string()
}

fn default_upstream_timeout() -> u64 {
    20 // seconds
}

/// Host, port, and TLS flag parsed out of the upstream base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl UpstreamConfig {
    /// Parse the base URL into connection parameters. The scheme picks
    /// plain vs encrypted transport; an explicit port wins over the
    /// scheme default.
    pub fn endpoint(&self) -> Result<UpstreamEndpoint, RelayError> {
        let (use_tls, rest) = if let Some(rest) = self.base_url.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(RelayError::Config(format!(
                "upstream base_url '{}' must start with http:// or https://",
                self.base_url
            )));
        };

        // Strip any path after the authority.
        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.is_empty() {
            return Err(RelayError::Config(format!(
                "upstream base_url '{}' has no host",
                self.base_url
            )));
        }

        let default_port = if use_tls { 443 } else { 80 };
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    RelayError::Config(format!(
                        "upstream base_url '{}' has an invalid port",
                        self.base_url
                    ))
                })?;
                (host, port)
            }
            None => (authority, default_port),
        };

        if host.is_empty() {
            return Err(RelayError::Config(format!(
                "upstream base_url '{}' has no host",
                self.base_url
            )));
        }

        Ok(UpstreamEndpoint {
            host: host.to_string(),
            port,
            use_tls,
        })
    }
}

impl RelayConfig {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, RelayError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| RelayError::Config(e.to_string()))?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                RelayError::Config(format!(
                    "environment variable '{}' is referenced but not set",
                    var_name
                ))
            })?;
        }

        // Now perform the substitution (we know all vars exist)
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap() // Safe because we checked above
        });

        serde_yaml::from_str(&substituted).map_err(|e| RelayError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("failed to read config file: {}", e)))?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Validate everything that would otherwise fail at request time.
    /// Called once at startup; a running process never re-reads config.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.endpoint_path.starts_with('/') {
            return Err(RelayError::Config(format!(
                "endpoint_path '{}' must start with /",
                self.endpoint_path
            )));
        }

        self.upstream.endpoint()?;

        if self.upstream.timeout == 0 {
            return Err(RelayError::Config(
                "upstream timeout must be greater than zero seconds".to_string(),
            ));
        }

        if let Some(signature) = &self.signature {
            crate::signing::SigningKey::from_hex(&signature.key, &signature.salt)?;
        }

        if let Some(whitelist) = &self.bucket_whitelist {
            // Same constraints the source grammar puts on the bucket segment
            for bucket in whitelist {
                if bucket.is_empty() || bucket.contains('/') || bucket.contains('.') {
                    return Err(RelayError::Config(format!(
                        "whitelisted bucket '{}' is not a valid bucket name",
                        bucket
                    )));
                }
            }
        }

        if let Some(headers) = &self.forwarded_headers {
            for name in headers {
                if name.is_empty() || !name.is_ascii() {
                    return Err(RelayError::Config(format!(
                        "forwarded header '{}' is not a valid header name",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    /// The effective response header allow-list, lowercased.
    pub fn forwarded_headers(&self) -> Vec<String> {
        match &self.forwarded_headers {
            Some(headers) => headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
            None => DEFAULT_FORWARDED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}
