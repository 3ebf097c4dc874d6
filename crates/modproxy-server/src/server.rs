use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use thiserror::Error;
use tracing::info;

use crate::FallbackRouter;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure listener: {0}")]
    Listener(#[source] io::Error),
    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),
}

pub fn bind(addr: SocketAddr) -> Result<TcpListener, ServeError> {
    TcpListener::bind(addr).map_err(|source| ServeError::Bind { addr, source })
}

/// Serves `router` on `listener` until `shutdown` resolves, then drains
/// in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    router: FallbackRouter,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()>,
{
    listener.set_nonblocking(true).map_err(ServeError::Listener)?;

    let router = Arc::new(router);
    let make_svc = make_service_fn(move |_conn| {
        let router = Arc::clone(&router);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let router = Arc::clone(&router);
                async move { Ok::<_, Infallible>(router.handle(req).await) }
            }))
        }
    });

    let server = Server::from_tcp(listener)?.serve(make_svc);
    info!(addr = %server.local_addr(), "module proxy listening");

    server.with_graceful_shutdown(shutdown).await?;
    info!("module proxy stopped");
    Ok(())
}
