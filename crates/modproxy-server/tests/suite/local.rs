use hyper::{Method, StatusCode};
use modproxy_resolve::{QueryKind, ResolutionOutcome};
use serde_json::json;

use crate::harness::{
    get, module, router, send, unreachable_upstream, upstream_config, versions, FakeResolver,
    Scripted,
};

#[tokio::test]
async fn latest_is_answered_locally() {
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
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@latest").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    assert_eq!(
        reply.text(),
        r#"{"Version":"v1.0.0","Time":"2024-01-01T00:00:00Z"}"#
    );
    assert_eq!(
        resolver.calls(),
        [(QueryKind::Latest, "example.com/mod@latest".to_owned())]
    );
}

#[tokio::test]
async fn info_uses_a_coordinate_query() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "github.com/foo/bar@v1.2.3",
        module(json!({
            "Path": "github.com/foo/bar",
            "Version": "v1.2.3",
            "Time": "2023-06-01T12:00:00Z"
        })),
    );
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/github.com/foo/bar/@v/v1.2.3.info").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.text(),
        r#"{"Version":"v1.2.3","Time":"2023-06-01T12:00:00Z"}"#
    );
}

#[tokio::test]
async fn list_is_newline_joined_plaintext() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::VersionList,
        "example.com/mod",
        versions(json!({
            "Path": "example.com/mod",
            "Versions": ["v1.0.0", "v1.0.1", "v1.1.0"]
        })),
    );
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@v/list").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(reply.text(), "v1.0.0\nv1.0.1\nv1.1.0");
}

#[tokio::test]
async fn mod_and_zip_stream_resolved_files() {
    let cache = tempfile::tempdir().unwrap();
    let go_mod = cache.path().join("v1.0.0.mod");
    let zip = cache.path().join("v1.0.0.zip");
    std::fs::write(&go_mod, "module example.com/mod\n\ngo 1.21\n").unwrap();
    std::fs::write(&zip, b"PK\x03\x04fake-archive").unwrap();

    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::VersionDetail,
        "example.com/mod@v1.0.0",
        module(json!({
            "Path": "example.com/mod",
            "Version": "v1.0.0",
            "GoMod": go_mod,
            "Zip": zip,
        })),
    );
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@v/v1.0.0.mod").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(reply.text(), "module example.com/mod\n\ngo 1.21\n");

    let reply = get(&router, "/example.com/mod/@v/v1.0.0.zip").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("application/zip"));
    assert_eq!(reply.body, b"PK\x03\x04fake-archive");

    // Each artifact request resolves independently.
    assert_eq!(resolver.calls().len(), 2);
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "example.com/mod@v1.0.0",
        module(json!({
            "Path": "example.com/mod",
            "Version": "v1.0.0",
            "Time": "2024-01-01T00:00:00Z"
        })),
    );
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let first = get(&router, "/example.com/mod/@v/v1.0.0.info").await;
    let second = get(&router, "/example.com/mod/@v/v1.0.0.info").await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn unreadable_artifact_is_a_500_without_the_path() {
    let cache = tempfile::tempdir().unwrap();
    let missing = cache.path().join("module-cache-secret").join("v1.0.0.zip");

    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::VersionDetail,
        "example.com/mod@v1.0.0",
        module(json!({
            "Path": "example.com/mod",
            "Version": "v1.0.0",
            "Zip": missing,
        })),
    );
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@v/v1.0.0.zip").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert!(!reply.text().contains("module-cache-secret"), "{}", reply.text());
}

#[tokio::test]
async fn malformed_toolchain_output_is_a_500() {
    let resolver = FakeResolver::new();
    resolver.script(QueryKind::Latest, "example.com/mod@latest", Scripted::ParseError);
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@latest").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.text().contains("malformed output"), "{}", reply.text());
}

#[tokio::test]
async fn unknown_paths_are_404() {
    let resolver = FakeResolver::new();
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@v/v1.0.0.tar.gz").await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.text(), "not found");
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn bad_case_encoding_is_400() {
    let resolver = FakeResolver::new();
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/github.com/Azure/sdk/@latest").await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn case_encoded_module_is_decoded_for_resolution() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "github.com/Azure/sdk@latest",
        module(json!({"Path": "github.com/Azure/sdk", "Version": "v0.1.0"})),
    );
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/github.com/!azure/sdk/@latest").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), r#"{"Version":"v0.1.0"}"#);
}

#[tokio::test]
async fn percent_encoded_version_is_decoded_for_resolution() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::Latest,
        "example.com/mod@v2.0.0+incompatible",
        module(json!({"Path": "example.com/mod", "Version": "v2.0.0+incompatible"})),
    );
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/mod/@v/v2.0.0%2Bincompatible.info").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), r#"{"Version":"v2.0.0+incompatible"}"#);
    assert_eq!(
        resolver.calls(),
        [(QueryKind::Latest, "example.com/mod@v2.0.0+incompatible".to_owned())]
    );
}

#[tokio::test]
async fn only_get_and_head_are_allowed() {
    let resolver = FakeResolver::new();
    let router = router(resolver.clone(), upstream_config(&unreachable_upstream()));

    let reply = send(&router, Method::POST, "/example.com/mod/@latest").await;

    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn timeout_is_reported_in_the_body() {
    let resolver = FakeResolver::new();
    resolver.answer(
        QueryKind::VersionList,
        "example.com/slow",
        ResolutionOutcome::Timeout("`go list -json -m -versions example.com/slow` timed out after 5s".into()),
    );
    let router = router(resolver, upstream_config(&unreachable_upstream()));

    let reply = get(&router, "/example.com/slow/@v/list").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.text().contains("timed out"), "{}", reply.text());
}
