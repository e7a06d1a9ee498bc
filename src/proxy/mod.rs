// Pingora proxy service for the image transform relay

use async_trait::async_trait;
use bytes::Bytes;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{FailToProxy, ProxyHttp, Session};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RelayConfig, UpstreamEndpoint};
use crate::error::RelayError;
use crate::pipeline::RequestContext;

pub mod decision;
pub mod headers;
pub mod query;

use decision::{RelayDecision, RelayPipeline};
use headers::ForwardPolicy;

/// RelayProxy implements the Pingora ProxyHttp trait.
/// Validates transform requests and relays them to the transform service.
pub struct RelayProxy {
    config: Arc<RelayConfig>,
    pipeline: RelayPipeline,
    forward_policy: ForwardPolicy,
    upstream: UpstreamEndpoint,
    /// Proxy start time (for uptime in the /health endpoint)
    start_time: Instant,
}

impl RelayProxy {
    /// Create a new RelayProxy from validated configuration.
    pub fn new(config: RelayConfig) -> std::result::Result<Self, RelayError> {
        let pipeline = RelayPipeline::from_config(&config)?;
        let forward_policy = ForwardPolicy::new(config.forwarded_headers());
        let upstream = config.upstream.endpoint()?;
        Ok(Self {
            config: Arc::new(config),
            pipeline,
            forward_policy,
            upstream,
            start_time: Instant::now(),
        })
    }

    /// Send a header-only response and end the stream.
    async fn respond_empty(&self, session: &mut Session, status: u16) -> Result<()> {
        let mut header = ResponseHeader::build(status, None)?;
        header.insert_header("Content-Length", "0")?;
        session.write_response_header(Box::new(header), true).await?;
        Ok(())
    }
}

#[async_trait]
impl ProxyHttp for RelayProxy {
    type CTX = RequestContext;

    /// Create a new request context for each incoming request
    fn new_ctx(&self) -> Self::CTX {
        RequestContext::default()
    }

    /// Validate the request and answer locally when it never needs the
    /// upstream: health checks, unknown paths, unsupported methods and
    /// malformed transform requests.
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        let path = req.uri.path().to_string();
        let method = req.method.to_string();
        let query = req.uri.query().map(|q| q.to_string());

        *ctx = RequestContext::new(method.clone(), path.clone());

        // Health endpoint bypasses the relay pipeline entirely
        if path == "/health" {
            let uptime_seconds = self.start_time.elapsed().as_secs();
            let version = env!("CARGO_PKG_VERSION");

            let health_response = serde_json::json!({
                "status": "healthy",
                "uptime_seconds": uptime_seconds,
                "version": version
            })
            .to_string();

            let mut header = ResponseHeader::build(200, None)?;
            header.insert_header("Content-Type", "application/json")?;
            header.insert_header("Content-Length", health_response.len().to_string())?;

            session
                .write_response_header(Box::new(header), false)
                .await?;
            session
                .write_response_body(Some(Bytes::from(health_response)), true)
                .await?;

            return Ok(true); // Short-circuit (response already sent)
        }

        // The relay speaks GET only, like the endpoint it fronts
        if method != "GET" {
            tracing::info!(
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
                "Rejecting unsupported method"
            );
            ctx.set_rejected(405);
            self.respond_empty(session, 405).await?;
            return Ok(true);
        }

        match self.pipeline.evaluate(&path, query.as_deref()) {
            RelayDecision::Reject { status, reason } => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    path = %path,
                    status = status,
                    reason = %reason,
                    "Rejecting request before upstream contact"
                );
                ctx.set_rejected(status);
                self.respond_empty(session, status).await?;
                Ok(true) // Short-circuit, no outbound request
            }
            RelayDecision::Forward {
                upstream_path,
                bucket,
            } => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    bucket = %bucket,
                    upstream_path = %upstream_path,
                    "Relaying to transform service"
                );
                ctx.set_source_bucket(bucket);
                ctx.set_upstream_path(upstream_path);
                Ok(false)
            }
        }
    }

    /// Determine the transform service peer for this request
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let mut peer = Box::new(HttpPeer::new(
            (self.upstream.host.clone(), self.upstream.port),
            self.upstream.use_tls,
            self.upstream.host.clone(),
        ));

        let timeout_duration = Duration::from_secs(self.config.upstream.timeout);
        peer.options.connection_timeout = Some(timeout_duration);
        peer.options.read_timeout = Some(timeout_duration);
        peer.options.write_timeout = Some(timeout_duration);

        tracing::debug!(
            request_id = %ctx.request_id(),
            host = %self.upstream.host,
            port = self.upstream.port,
            tls = self.upstream.use_tls,
            timeout_seconds = self.config.upstream.timeout,
            "Configured transform service peer"
        );

        Ok(peer)
    }

    /// Rewrite the outbound request: the assembled transform path
    /// replaces the inbound URI, the Host header names the upstream, and
    /// the service token rides along as a Bearer credential.
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        let upstream_path = ctx.upstream_path().ok_or_else(|| {
            pingora_core::Error::explain(
                pingora_core::ErrorType::InternalError,
                "No upstream path in context",
            )
        })?;

        let parsed_uri = upstream_path
            .parse()
            .map_err(|e: http::uri::InvalidUri| {
                pingora_core::Error::explain(
                    pingora_core::ErrorType::InternalError,
                    format!("Invalid URI: {}", e),
                )
            })?;
        upstream_request.set_uri(parsed_uri);

        upstream_request.remove_header(&http::header::HOST);
        upstream_request.insert_header("Host", self.upstream.host.clone())?;

        if let Some(token) = &self.config.upstream.auth_token {
            upstream_request.insert_header("Authorization", format!("Bearer {}", token))?;
        }

        Ok(())
    }

    /// Reduce the upstream response to the forwardable header set. The
    /// status code passes through untouched, including upstream errors.
    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        self.forward_policy.apply(upstream_response);
        upstream_response.insert_header("X-Request-ID", ctx.request_id())?;
        Ok(())
    }

    /// Any failure between here and the upstream is a plain 500 to the
    /// client, with nothing about the transform service leaking out.
    async fn fail_to_proxy(
        &self,
        session: &mut Session,
        e: &pingora_core::Error,
        ctx: &mut Self::CTX,
    ) -> FailToProxy
    where
        Self::CTX: Send + Sync,
    {
        let transport_error = RelayError::UpstreamTransport(e.to_string());
        let status = transport_error.status_code();
        tracing::error!(
            request_id = %ctx.request_id(),
            path = %ctx.path(),
            error = %transport_error,
            "Upstream relay failed"
        );
        ctx.set_rejected(status);
        let _ = session.respond_error(status).await;
        FailToProxy {
            error_code: status,
            can_reuse_downstream: false,
        }
    }

    /// Log request completion for tracing and debugging
    async fn logging(
        &self,
        session: &mut Session,
        e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let status_code = if let Some(resp) = session.response_written() {
            resp.status.as_u16()
        } else {
            ctx.rejected_with().unwrap_or(500)
        };

        let duration_ms = ctx.elapsed().as_millis() as u64;

        if let Some(error) = e {
            tracing::warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status_code = status_code,
                duration_ms = duration_ms,
                error = %error,
                "Request failed"
            );
            return;
        }

        tracing::info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            bucket = ctx.source_bucket().unwrap_or("-"),
            status_code = status_code,
            duration_ms = duration_ms,
            "Request completed"
        );
    }
}
