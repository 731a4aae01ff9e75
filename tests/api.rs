//! Drives the real HTTP client against a one-shot in-process server.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use whereareyou_lib::auth::{self, SessionStore};
use whereareyou_lib::location::{FixedPosition, Position};
use whereareyou_lib::reporter::{LocationReporter, ReportOutcome};
use whereareyou_lib::storage::FileStorage;
use whereareyou_lib::sync::{ApiClient, GetUserLocationRequest, UserLocation};

struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Accept a single connection, capture the request, answer with `status`/`body`
async fn serve_once(status: &'static str, response_body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8(buf[..header_end].to_vec()).unwrap();
        let mut lines = head.split("\r\n").filter(|line| !line.is_empty());
        let request_line = lines.next().unwrap().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| value.parse::<usize>().unwrap())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let request_body =
            String::from_utf8(buf[header_end..header_end + content_length].to_vec()).unwrap();

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            response_body.len(),
            response_body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        Captured { request_line, headers, body: request_body }
    });

    (base_url, handle)
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(base_url, Duration::from_secs(5)).unwrap()
}

fn store_with(dir: &tempfile::TempDir, token: &str, member_id: &str) -> SessionStore {
    let store = SessionStore::open(FileStorage::at(dir.path()));
    store.save(token, member_id).unwrap();
    store
}

#[tokio::test]
async fn one_tick_sends_exact_request() {
    let (base_url, server) = serve_once("200 OK", "true").await;
    let dir = tempfile::tempdir().unwrap();

    let mut reporter = LocationReporter::new(
        store_with(&dir, "Bearer abc", "u1"),
        Arc::new(FixedPosition(Position::new(37.5, 127.0))),
        Arc::new(client(&base_url)),
        Duration::from_millis(50),
    );
    let mut status = reporter.subscribe();

    reporter.start(&CancellationToken::new()).unwrap();
    let first = loop {
        status.changed().await.unwrap();
        let current = status.borrow_and_update().clone();
        if current.ticks >= 1 {
            break current;
        }
    };
    reporter.stop().await.unwrap();

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /location HTTP/1.1");
    assert_eq!(captured.header("authorization"), Some("Bearer abc"));
    assert_eq!(
        captured.json(),
        serde_json::json!({ "memberId": "u1", "latitude": 37.5, "longitude": 127.0 })
    );
    assert_eq!(first.last_outcome, Some(ReportOutcome::Success));
}

#[tokio::test]
async fn non_success_status_is_rejected_with_server_message() {
    let (base_url, server) = serve_once("401 Unauthorized", r#"{"message":"token expired"}"#).await;
    let dir = tempfile::tempdir().unwrap();

    let reporter = LocationReporter::new(
        store_with(&dir, "Bearer stale", "u1"),
        Arc::new(FixedPosition::default()),
        Arc::new(client(&base_url)),
        Duration::from_secs(20),
    );

    let outcome = reporter.report_once().await;
    server.await.unwrap();

    assert_eq!(
        outcome,
        ReportOutcome::Rejected { status: Some(401), message: "token expired".into() }
    );
}

#[tokio::test]
async fn false_body_is_rejected() {
    let (base_url, server) = serve_once("200 OK", "false").await;
    let dir = tempfile::tempdir().unwrap();

    let reporter = LocationReporter::new(
        store_with(&dir, "Bearer abc", "u1"),
        Arc::new(FixedPosition::default()),
        Arc::new(client(&base_url)),
        Duration::from_secs(20),
    );

    let outcome = reporter.report_once().await;
    server.await.unwrap();

    assert!(matches!(outcome, ReportOutcome::Rejected { status: None, .. }));
}

#[tokio::test]
async fn unreachable_server_is_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let dir = tempfile::tempdir().unwrap();

    let reporter = LocationReporter::new(
        store_with(&dir, "Bearer abc", "u1"),
        Arc::new(FixedPosition::default()),
        Arc::new(client(&base_url)),
        Duration::from_secs(20),
    );

    let outcome = reporter.report_once().await;
    assert!(matches!(outcome, ReportOutcome::TransportFailure { .. }));
}

#[tokio::test]
async fn sign_in_stores_bearer_token_and_member_id() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"accessToken":"abc","refreshToken":"r1","memberId":"u1"}"#,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(FileStorage::at(dir.path()));

    let session = auth::sign_in(&client(&base_url), &store, "member01", "secret")
        .await
        .unwrap();

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /member/login HTTP/1.1");
    assert_eq!(
        captured.json(),
        serde_json::json!({ "userId": "member01", "password": "secret" })
    );
    assert_eq!(session.access_token, "Bearer abc");
    assert_eq!(session.member_id, "u1");
    assert_eq!(session.refresh_token, "r1");
    assert!(store.is_signed_in());
}

#[tokio::test]
async fn reissue_replaces_tokens_and_keeps_member() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"accessToken":"fresh","refreshToken":"r2"}"#,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(FileStorage::at(dir.path()));
    store.save_tokens("Bearer old", "u1", "r1").unwrap();

    let session = auth::reissue(&client(&base_url), &store).await.unwrap();

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /member/tokenReissue HTTP/1.1");
    assert_eq!(
        captured.json(),
        serde_json::json!({ "memberId": "u1", "refreshToken": "r1" })
    );
    assert_eq!(session.access_token, "Bearer fresh");
    assert_eq!(session.refresh_token, "r2");
    assert_eq!(session.member_id, "u1");
}

#[tokio::test]
async fn failed_sign_in_leaves_store_signed_out() {
    let (base_url, server) = serve_once("400 Bad Request", r#"{"error":"bad credentials"}"#).await;
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(FileStorage::at(dir.path()));

    let err = auth::sign_in(&client(&base_url), &store, "someone", "wrong")
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(err.to_string().contains("bad credentials"));
    assert!(!store.is_signed_in());
}

#[tokio::test]
async fn participant_locations_are_listed() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"[{"memberId":"u2","latitude":35.1,"longitude":129.0}]"#,
    )
    .await;

    let locations = client(&base_url)
        .get_user_location(
            "Bearer abc",
            &GetUserLocationRequest { member_id: "u1".into(), friend_member_ids: vec!["u2".into()] },
        )
        .await
        .unwrap();

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line, "POST /location/list HTTP/1.1");
    assert_eq!(captured.header("authorization"), Some("Bearer abc"));
    assert_eq!(
        locations,
        vec![UserLocation { member_id: "u2".into(), latitude: 35.1, longitude: 129.0 }]
    );
}
