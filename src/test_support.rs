//! Canned HTTP backends for exercising the real client code.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;

/// Client that ignores proxy settings, so loopback servers are hit directly.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("build test http client")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn answer(
    State(canned): State<Canned>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> impl IntoResponse {
    canned
        .seen
        .lock()
        .expect("request log")
        .push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body.clone(),
    )
}

/// A backend answering every request with `status` and `body`.
pub struct CannedServer {
    pub base: String,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CannedServer {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.seen.lock().expect("request log").clone()
    }
}

pub async fn serve(status: u16, body: &str) -> CannedServer {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(answer).with_state(Canned {
        status: StatusCode::from_u16(status).expect("valid status"),
        body: body.to_string(),
        seen: seen.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test backend");
    let addr = listener.local_addr().expect("test backend address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    CannedServer {
        base: format!("http://{}", addr),
        seen,
    }
}

pub async fn respond(status: u16, body: &str) -> String {
    serve(status, body).await.base
}

/// An address nothing listens on.
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind unused port");
    let addr = listener.local_addr().expect("unused port address");
    drop(listener);
    format!("http://{}", addr)
}
