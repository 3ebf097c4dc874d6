//! HTTP front end for the module proxy protocol.
//!
//! Requests are parsed by [`parse_request_path`], answered locally through a
//! [`modproxy_resolve::ModuleResolver`] and shaped by [`normalize`]; when the
//! local toolchain cannot answer, [`FallbackRouter`] relays the upstream
//! registry's response verbatim.

mod error;
mod respond;
mod route;
mod router;
mod server;
mod upstream;

pub use error::ProxyError;
pub use respond::{normalize, LocalResponse, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, CONTENT_TYPE_ZIP};
pub use route::{parse_request_path, ProxyRequest, ResourceKind, RouteError};
pub use router::FallbackRouter;
pub use server::{bind, serve, ServeError};
pub use upstream::{UpstreamClient, UpstreamError, UpstreamReply};
