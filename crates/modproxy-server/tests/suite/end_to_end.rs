use std::net::SocketAddr;

use httpmock::prelude::*;
use modproxy_resolve::QueryKind;
use modproxy_server::{bind, serve};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::harness::{module, router, upstream_config, FakeResolver};

struct RunningProxy {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), modproxy_server::ServeError>>,
}

impl RunningProxy {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle
            .await
            .expect("server task")
            .expect("server exits cleanly");
    }
}

fn start(router: modproxy_server::FallbackRouter) -> RunningProxy {
    let listener = bind("127.0.0.1:0".parse().unwrap()).expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, router, async {
        let _ = shutdown_rx.await;
    }));
    RunningProxy {
        addr,
        shutdown,
        handle,
    }
}

#[tokio::test]
async fn serves_local_and_fallback_responses_over_http() {
    let upstream = MockServer::start_async().await;
    upstream
        .mock_async(|when, then| {
            when.method(GET).path("/example.com/other/@v/list");
            then.status(200)
                .header("content-type", "text/plain; charset=utf-8")
                .body("v0.1.0\nv0.2.0");
        })
        .await;

    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "example.com/mod@latest",
        module(json!({
            "Path": "example.com/mod",
            "Version": "v1.0.0",
            "Time": "2024-01-01T00:00:00Z"
        })),
    );
    let proxy = start(router(resolver, upstream_config(&upstream.base_url())));
    let client = reqwest::Client::new();

    let local = client
        .get(format!("http://{}/example.com/mod/@latest", proxy.addr))
        .send()
        .await
        .expect("local request");
    assert_eq!(local.status().as_u16(), 200);
    assert_eq!(
        local.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        local.text().await.unwrap(),
        r#"{"Version":"v1.0.0","Time":"2024-01-01T00:00:00Z"}"#
    );

    let relayed = client
        .get(format!("http://{}/example.com/other/@v/list", proxy.addr))
        .send()
        .await
        .expect("fallback request");
    assert_eq!(relayed.status().as_u16(), 200);
    assert_eq!(relayed.text().await.unwrap(), "v0.1.0\nv0.2.0");

    proxy.stop().await;
}

#[tokio::test]
async fn head_requests_share_get_handling() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "example.com/mod@latest",
        module(json!({"Path": "example.com/mod", "Version": "v1.0.0"})),
    );
    let proxy = start(router(
        resolver.clone(),
        upstream_config(&crate::harness::unreachable_upstream()),
    ));

    let response = reqwest::Client::new()
        .head(format!("http://{}/example.com/mod/@latest", proxy.addr))
        .send()
        .await
        .expect("head request");

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert!(response.bytes().await.unwrap().is_empty());
    assert_eq!(resolver.calls().len(), 1);

    proxy.stop().await;
}
