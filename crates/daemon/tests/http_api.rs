//! End-to-end tests for the HTTP surface
//!
//! These drive the full router (authorization gate included) in-process with
//! `oneshot`, faking the TCP peer address with `MockConnectInfo`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use common::prelude::{AccessPolicy, AuthConfig, FileDigest, PathResolver, TransferService};
use ferry_daemon::http_server::{self, ClientIpResolver, Config};
use ferry_daemon::ServiceState;

const BOUNDARY: &str = "ferry-test-boundary";

struct Harness {
    dir: TempDir,
    state: ServiceState,
    config: Config,
}

impl Harness {
    fn new(ips: &[&str], secret: &str) -> Self {
        Self::with_proxies(ips, secret, &[])
    }

    fn with_proxies(ips: &[&str], secret: &str, proxies: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let policy = AccessPolicy::from_config(&AuthConfig {
            authorized_ips: ips.iter().map(|s| s.to_string()).collect(),
            authorization_header: secret.to_string(),
        })
        .unwrap();
        let transfers = TransferService::new(PathResolver::new(dir.path()).unwrap());
        let proxies = proxies.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let state = ServiceState::new(
            Arc::new(policy),
            transfers,
            ClientIpResolver::new(&proxies).unwrap(),
        );
        let config = Config::new(
            "127.0.0.1:0".parse().unwrap(),
            "/download",
            "/upload",
            16 * 1024 * 1024,
        )
        .unwrap();

        Self { dir, state, config }
    }

    fn app(&self, peer: &str) -> Router {
        let peer: SocketAddr = format!("{}:40000", peer).parse().unwrap();
        http_server::router(&self.config, self.state.clone()).layer(MockConnectInfo(peer))
    }

    fn write(&self, relative: &str, content: &[u8]) {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.dir.path().join(relative)).unwrap()
    }
}

enum Field<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(fields: &[Field]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match field {
            Field::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Field::File(name, filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(fields: &[Field], token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::from(multipart_body(fields))).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_allowlisted_ip_or_token_is_authorized() {
    let harness = Harness::new(&["10.0.0.5"], "tok");
    harness.write("hello.txt", b"abc");

    let response = harness
        .app("10.0.0.5")
        .oneshot(get("/download/hello.txt", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app("10.0.0.9")
        .oneshot(get("/download/hello.txt", Some("tok")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app("10.0.0.9")
        .oneshot(get("/download/hello.txt", Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["status"], "unauthorized");

    let response = harness
        .app("10.0.0.9")
        .oneshot(get("/download/hello.txt", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unauthorized_upload_writes_nothing() {
    let harness = Harness::new(&["10.0.0.5"], "tok");

    let request = upload_request(
        &[
            Field::Text("to", "/docs"),
            Field::File("file", "hello.txt", b"abc"),
        ],
        Some("wrong"),
    );
    let response = harness.app("10.0.0.9").oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(std::fs::read_dir(harness.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let harness = Harness::new(&["127.0.0.1"], "");

    for uri in [
        "/download/../../etc/passwd",
        "/download//../../etc/passwd",
        "/download/%2E%2E/%2E%2E/etc/passwd",
        "/download/..%2F..%2Fetc%2Fpasswd",
    ] {
        let response = harness.app("127.0.0.1").oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(response).await["status"], "invalid_path", "{}", uri);
    }
}

#[tokio::test]
async fn test_malformed_escape_is_invalid_filename() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let response = harness
        .app("127.0.0.1")
        .oneshot(get("/download/bad%zzname", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "invalid_filename");
}

#[tokio::test]
async fn test_upload_then_conflict() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = upload_request(
        &[
            Field::Text("to", "/docs"),
            Field::File("file", "hello.txt", b"abc"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["uploadedFileHash"], FileDigest::of(b"abc").to_hex());
    assert_eq!(body["size"], 3);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("IP: 127.0.0.1 | Uploaded file: hello.txt | Size: 3 bytes"));
    assert_eq!(harness.read("docs/hello.txt"), b"abc");

    // different content
    let request = upload_request(
        &[
            Field::Text("to", "/docs"),
            Field::File("file", "hello.txt", b"xyz"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["status"], "conflict");
    assert_eq!(body["existingFileHash"], FileDigest::of(b"abc").to_hex());
    assert_eq!(body["uploadedFileHash"], FileDigest::of(b"xyz").to_hex());
    assert_eq!(harness.read("docs/hello.txt"), b"abc");

    // identical content is still a conflict, with matching digests
    let request = upload_request(
        &[
            Field::File("file", "hello.txt", b"abc"),
            Field::Text("to", "docs"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["existingFileHash"], body["uploadedFileHash"]);
    assert_eq!(harness.read("docs/hello.txt"), b"abc");
}

#[tokio::test]
async fn test_upload_download_roundtrip() {
    let harness = Harness::new(&[], "tok");
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();

    let request = upload_request(
        &[
            Field::Text("to", "nested/dir"),
            Field::File("file", "hello world.bin", &content),
        ],
        Some("tok"),
    );
    let response = harness.app("192.0.2.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app("192.0.2.1")
        .oneshot(get("/download/nested/dir/hello%20world.bin", Some("tok")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        content.len().to_string().as_str()
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"hello world.bin\""
    );
    assert_eq!(body_bytes(response).await, content);

    // an encoded separator works the same as a plain one
    let response = harness
        .app("192.0.2.1")
        .oneshot(get("/download/nested%2Fdir%2Fhello%20world.bin", Some("tok")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_filename_is_reduced_to_base_name() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = upload_request(
        &[
            Field::Text("to", "/docs"),
            Field::File("file", "../../escape.txt", b"abc"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.read("docs/escape.txt"), b"abc");
}

#[tokio::test]
async fn test_upload_traversal_in_destination() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = upload_request(
        &[
            Field::Text("to", "../../tmp"),
            Field::File("file", "x.txt", b"abc"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "invalid_path");
    assert_eq!(std::fs::read_dir(harness.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_missing_fields() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = upload_request(&[Field::File("file", "hello.txt", b"abc")], None);
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "missing_field");
    assert_eq!(body["message"], "to is not found");

    let request = upload_request(&[Field::Text("to", "/docs")], None);
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "missing_field");

    // nothing left behind, not even a spool file
    assert_eq!(std::fs::read_dir(harness.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_without_multipart_body() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "bad_request");
}

#[tokio::test]
async fn test_missing_and_directory_downloads_are_not_found() {
    let harness = Harness::new(&["127.0.0.1"], "");
    std::fs::create_dir_all(harness.dir.path().join("sub")).unwrap();

    for uri in ["/download/missing.txt", "/download/sub"] {
        let response = harness.app("127.0.0.1").oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body_json(response).await["status"], "not_found");
    }
}

#[tokio::test]
async fn test_fallback_and_status_routes_are_gated() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let response = harness
        .app("127.0.0.1")
        .oneshot(get("/nope", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["status"], "not_found");

    let response = harness
        .app("203.0.113.7")
        .oneshot(get("/nope", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    for check in ["livez", "readyz", "version"] {
        let uri = format!("/_status/{}", check);
        let response = harness.app("127.0.0.1").oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);

        let response = harness
            .app("203.0.113.7")
            .oneshot(get(&uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[tokio::test]
async fn test_forwarded_for_only_from_trusted_proxy() {
    let harness = Harness::with_proxies(&["10.0.0.5"], "", &["127.0.0.1"]);
    harness.write("hello.txt", b"abc");

    let forwarded = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "10.0.0.5")
            .body(Body::empty())
            .unwrap()
    };

    let response = harness
        .app("127.0.0.1")
        .oneshot(forwarded("/download/hello.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the same header from anyone else is ignored
    let response = harness
        .app("203.0.113.7")
        .oneshot(forwarded("/download/hello.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_filename_with_trailing_space_roundtrips() {
    let harness = Harness::new(&["127.0.0.1"], "");

    let request = upload_request(
        &[
            Field::Text("to", "/docs"),
            Field::File("file", "note.txt ", b"abc"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!harness.dir.path().join("docs/note.txt").exists());

    let response = harness
        .app("127.0.0.1")
        .oneshot(get("/download/docs/note.txt%20", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"abc");
}

#[tokio::test]
async fn test_download_stat_failure_is_internal_error() {
    let harness = Harness::new(&["127.0.0.1"], "");
    harness.write("hello.txt", b"abc");

    let response = harness
        .app("127.0.0.1")
        .oneshot(get("/download/hello.txt/x", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["status"], "internal_error");
}

#[tokio::test]
async fn test_spool_leftovers_are_hidden() {
    let harness = Harness::new(&["127.0.0.1"], "");
    harness.write(".ferry-upload-Xk2p9q", b"someone else's upload");

    let response = harness
        .app("127.0.0.1")
        .oneshot(get("/download/.ferry-upload-Xk2p9q", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = upload_request(
        &[
            Field::Text("to", "/"),
            Field::File("file", ".ferry-upload-Xk2p9q", b"abc"),
        ],
        None,
    );
    let response = harness.app("127.0.0.1").oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "invalid_filename");
}
