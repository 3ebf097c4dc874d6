use std::sync::Arc;

use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use modproxy_config::ProxyConfig;
use modproxy_resolve::{GoResolver, ModuleResolver, ResolutionOutcome};
use tracing::{error, info, info_span, warn, Instrument};

use crate::respond::{self, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT};
use crate::route::{parse_request_path, ProxyRequest, RouteError};
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamReply};
use crate::ProxyError;

/// Answers module-proxy requests from the local resolver, falling back to
/// the upstream registry when local resolution fails.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    resolver: Arc<dyn ModuleResolver>,
    upstream: UpstreamClient,
}

impl FallbackRouter {
    pub fn new(resolver: Arc<dyn ModuleResolver>, upstream: UpstreamClient) -> Self {
        Self { resolver, upstream }
    }

    /// Router backed by the `go` toolchain, per `config`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, UpstreamError> {
        let resolver = GoResolver::from_config(&config.toolchain);
        let upstream = UpstreamClient::from_config(&config.upstream)?;
        Ok(Self::new(Arc::new(resolver), upstream))
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let request = match parse_request_path(req.uri().path()) {
            Ok(request) => request,
            Err(RouteError::NotFound) => return plain(StatusCode::NOT_FOUND, "not found"),
            Err(err @ (RouteError::BadEscape { .. } | RouteError::BadPercentEncoding)) => {
                return plain(StatusCode::BAD_REQUEST, err.to_string())
            }
        };

        let span = info_span!(
            "request",
            kind = %request.kind,
            coordinate = %request.coordinate
        );
        async {
            match self.proxy(&request).await {
                Ok(response) => response,
                Err(err) => {
                    error!(error = %err, "request failed");
                    plain(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs the local-first, upstream-second algorithm for one request.
    pub async fn proxy(&self, request: &ProxyRequest) -> Result<Response<Body>, ProxyError> {
        let outcome = self
            .resolver
            .resolve(request.kind.query_kind(), &request.coordinate)
            .await?;

        match outcome {
            ResolutionOutcome::Success(resolution) => {
                let local = respond::normalize(request.kind, resolution).await?;
                info!(bytes = local.body.len(), "served from local toolchain");
                Ok(with_content_type(
                    StatusCode::OK,
                    HeaderValue::from_static(local.content_type),
                    local.body,
                ))
            }
            ResolutionOutcome::ResolutionError(message) => {
                warn!(error = %message, "local resolution failed; falling back to upstream");
                let reply = self.upstream.fetch(&request.path).await?;
                info!(status = %reply.status, bytes = reply.body.len(), "relayed upstream response");
                Ok(relay(reply))
            }
            ResolutionOutcome::Timeout(message) => Err(ProxyError::Timeout(message)),
        }
    }
}

fn relay(reply: UpstreamReply) -> Response<Body> {
    let status = StatusCode::from_u16(reply.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = reply
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static(CONTENT_TYPE_JSON));
    with_content_type(status, content_type, reply.body)
}

fn plain(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    with_content_type(
        status,
        HeaderValue::from_static(CONTENT_TYPE_TEXT),
        body.into().into_bytes(),
    )
}

fn with_content_type(status: StatusCode, content_type: HeaderValue, body: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}
