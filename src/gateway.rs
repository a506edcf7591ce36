use anyhow::Result;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{middleware, Json, Router};
use bytes::Bytes;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::bail_gateway;
use crate::config::Config;
use crate::confidence::{confidence_from_predictions, ensure_confidence};
use crate::cors::cors_middleware;
use crate::error::{GatewayError, GatewayResult};
use crate::extractors::VideoUploadForm;
use crate::upstream::{UpstreamClient, UpstreamReply};

pub const IMAGE_ROUTE: &str = "/api/detect";
pub const VIDEO_ROUTE: &str = "/api/detect-video";

#[derive(Clone)]
pub struct GatewayState {
    pub upstream: UpstreamClient,
}

/// Builds the gateway router from a fully resolved configuration.
pub fn app(config: &Config) -> Result<Router> {
    let state = GatewayState {
        upstream: UpstreamClient::new(config)?,
    };

    let router = Router::new()
        .route(
            IMAGE_ROUTE,
            post(handle_image_request)
                .fallback(not_found)
                .layer(DefaultBodyLimit::max(config.image_body_limit)),
        )
        .route(
            VIDEO_ROUTE,
            post(handle_video_request)
                .fallback(not_found)
                .layer(DefaultBodyLimit::max(config.video_body_limit)),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(cors_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    Ok(router)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

#[axum_macros::debug_handler]
async fn handle_image_request(
    State(state): State<GatewayState>,
    body: Result<Bytes, BytesRejection>,
) -> GatewayResult<Response> {
    let body = body.map_err(|rejection| GatewayError::new(rejection.status(), rejection.body_text()))?;
    debug!(bytes = body.len(), "Relaying image detection request");
    let reply = state.upstream.detect_image(body).await?;

    match parse_reply(&reply) {
        Some(mut json) => {
            ensure_confidence(&mut json);
            Ok((reply.status, Json(json)).into_response())
        }
        None => {
            warn!(status = reply.status.as_u16(), "Upstream image response is not JSON");
            Err(GatewayError::new(reply.status, "Invalid JSON from API").with_response(reply.text()))
        }
    }
}

#[axum_macros::debug_handler]
async fn handle_video_request(
    State(state): State<GatewayState>,
    form: VideoUploadForm,
) -> GatewayResult<Json<Value>> {
    let Some(upload) = form.file else {
        bail_gateway!(StatusCode::BAD_REQUEST, "No video file provided");
    };

    let file = match upload.open().await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %upload.filepath.display(), "Uploaded video is unreadable: {}", err);
            return Err(
                GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid video file path")
                    .with_video_file(upload.descriptor()),
            );
        }
    };

    debug!(
        field = %upload.field_name,
        size = upload.size,
        "Relaying video detection request"
    );
    let reply = state
        .upstream
        .detect_video(file, &upload, &form.params)
        .await?;

    match parse_reply(&reply) {
        Some(mut json) => {
            confidence_from_predictions(&mut json);
            Ok(Json(json))
        }
        None => {
            warn!(status = reply.status.as_u16(), "Upstream video response is not JSON");
            Err(
                GatewayError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid API response")
                    .with_response(reply.text()),
            )
        }
    }
}

/// A `null` document has no fields to normalize and counts as unparseable.
fn parse_reply(reply: &UpstreamReply) -> Option<Value> {
    match serde_json::from_slice(&reply.body) {
        Ok(Value::Null) | Err(_) => None,
        Ok(json) => Some(json),
    }
}
