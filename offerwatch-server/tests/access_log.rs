//! End-to-end checks on the `/api` access line: one line per API request,
//! silence for everything else, and a response that reaches the client
//! unchanged after its body was captured for the line.

use std::{
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::util::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

use offerwatch_core::{MemoryOfferStore, store::OfferStore, types::TargetSite};
use offerwatch_server::{
    AppState, create_app,
    infra::{
        config::Config,
        jobs::{JobRegistry, job_fn},
        startup::DAILY_SCAN_JOB,
    },
};

/// Collects everything the subscriber writes so tests can assert on it.
#[derive(Clone, Default)]
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    fn access_lines(&self) -> Vec<String> {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.contains("http::access"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for Capture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn build_state() -> AppState {
    let config = Config {
        server_host: "0.0.0.0".to_string(),
        server_port: 0,
        sites: vec![TargetSite::new("acme", "https://acme.example")],
        scan_interval: Duration::from_secs(24 * 60 * 60),
        new_member_refresh: Duration::from_secs(24 * 60 * 60),
        new_member_max_age: Duration::from_secs(24 * 60 * 60),
        job_timeout: Duration::from_secs(600),
        cors_allow_any: true,
        asset_dir: PathBuf::from("assets"),
        dev_mode: false,
    };
    let store: Arc<dyn OfferStore> = Arc::new(MemoryOfferStore::new());
    let registry = Arc::new(JobRegistry::new());
    registry
        .register(
            DAILY_SCAN_JOB,
            Duration::from_secs(24 * 60 * 60),
            Duration::from_secs(600),
            job_fn(|| async { Ok(()) }),
        )
        .unwrap();
    AppState::new(config, store, registry)
}

fn capture_subscriber(capture: &Capture) -> impl tracing::Subscriber {
    tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish()
}

#[tokio::test]
async fn api_requests_get_exactly_one_access_line() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    let app = create_app(build_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/offers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let lines = capture.access_lines();
    assert_eq!(lines.len(), 1, "one line per API request: {lines:?}");
    assert!(lines[0].contains("GET /api/offers 200 in"));
    assert!(lines[0].contains(r#":: {"count":0,"offers":[]}"#));
}

#[tokio::test]
async fn non_api_paths_stay_silent() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    let app = create_app(build_state());
    for path in ["/ping", "/health"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
    }

    assert!(
        capture.access_lines().is_empty(),
        "no access line outside /api"
    );
}

#[tokio::test]
async fn cors_preflights_produce_no_access_line() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    let app = create_app(build_state());
    let response = app
        .oneshot(
            Request::builder()
                .method(axum::http::Method::OPTIONS)
                .uri("/api/offers")
                .header(axum::http::header::ORIGIN, "http://localhost:5173")
                .header(axum::http::header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Answered by the CORS layer before the instrumentation runs.
    assert!(capture.access_lines().is_empty());
}

#[tokio::test]
async fn captured_body_still_reaches_the_client_unchanged() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    let app = create_app(build_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/offers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"count":0,"offers":[]}"#);
}

#[tokio::test]
async fn error_responses_are_logged_with_their_body() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    // Short site name keeps the whole line under the 80-char cap.
    let app = create_app(build_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/offers/na")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let lines = capture.access_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("GET /api/offers/na 404 in"));
    assert!(lines[0].contains(r#"{"message":"no offers recorded for na"}"#));
}

#[tokio::test]
async fn long_error_bodies_are_truncated_in_the_line_but_not_the_response() {
    let capture = Capture::default();
    let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

    let app = create_app(build_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/offers/some-very-long-site-name-that-nobody-registered")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.ends_with(r#"some-very-long-site-name-that-nobody-registered"}"#));

    let lines = capture.access_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with('…'), "capped line ends in an ellipsis");
    assert!(!lines[0].contains(r#"registered"}"#), "tail is cut from the line");
}
