// Test utilities: spawns the gateway and a fake upstream detection API on ephemeral ports.

#![allow(dead_code)]

use axum::extract::Multipart;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use detect_gateway::config::Config;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

pub const TEST_API_KEY: &str = "test-oracle-key";
pub const IMAGE_PATH: &str = "/oracle/v1/34/detect-image";
pub const VIDEO_PATH: &str = "/oracle/v1/34/detect-video";

/// An address nothing listens on, for transport failures.
pub const UNREACHABLE_UPSTREAM: &str = "http://127.0.0.1:1";

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    address
}

/// Starts a gateway relaying to `upstream_url` and returns its base URL.
pub async fn spawn_gateway(upstream_url: &str) -> String {
    spawn_gateway_with(upstream_url, |_| {}).await
}

/// Like [`spawn_gateway`], with a hook to adjust the configuration first.
pub async fn spawn_gateway_with(upstream_url: &str, configure: impl FnOnce(&mut Config)) -> String {
    let mut config = Config::default();
    config.address = "127.0.0.1".into();
    config.upstream_url = upstream_url.into();
    config.api_key = TEST_API_KEY.into();
    configure(&mut config);
    serve(detect_gateway::app(&config).unwrap()).await
}

/// Transport errors carry the client's description of the failed send.
pub fn assert_transport_error(message: &str) {
    assert!(
        message.contains("error sending request"),
        "unexpected transport error message: {message}"
    );
}

/// Starts a fake upstream and returns its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    serve(router).await
}

/// Upstream answering both detection endpoints with a fixed status and body.
pub fn canned_upstream(status: StatusCode, body: &'static str) -> Router {
    let reply = move |_body: Bytes| async move { (status, body) };
    Router::new()
        .route(IMAGE_PATH, post(reply))
        .route(VIDEO_PATH, post(reply))
}

/// Upstream reporting back what it received.
///
/// The image endpoint returns the raw request body and headers without a `confidence` field.
/// The video endpoint returns the multipart fields it saw next to `predictions` of
/// `[0.1, 0.9, 0.3]`.
pub fn echo_upstream() -> Router {
    Router::new()
        .route(IMAGE_PATH, post(echo_image))
        .route(VIDEO_PATH, post(echo_video))
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Value {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map_or(Value::Null, |value| json!(value))
}

async fn echo_image(headers: HeaderMap, body: Bytes) -> Json<Value> {
    Json(json!({
        "authorization": header_str(&headers, header::AUTHORIZATION),
        "contentType": header_str(&headers, header::CONTENT_TYPE),
        "raw": String::from_utf8_lossy(&body),
    }))
}

async fn echo_video(headers: HeaderMap, mut multipart: Multipart) -> Json<Value> {
    let mut fields = Map::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.unwrap();
                fields.insert(
                    name,
                    json!({
                        "fileName": file_name,
                        "contentType": content_type,
                        "content": String::from_utf8_lossy(&bytes),
                    }),
                );
            }
            None => {
                fields.insert(name, json!(field.text().await.unwrap()));
            }
        }
    }

    Json(json!({
        "authorization": header_str(&headers, header::AUTHORIZATION),
        "accept": header_str(&headers, header::ACCEPT),
        "fields": fields,
        "predictions": [0.1, 0.9, 0.3],
    }))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn assert_cors_headers(headers: &reqwest::header::HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
}
