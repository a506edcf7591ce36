use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct GatewayError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    error: String,
    /// Raw upstream body, when the upstream answered with something unparseable
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(rename = "videoFile", skip_serializing_if = "Option::is_none")]
    video_file: Option<Value>,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse {
            error: message,
            response: None,
            video_file: None,
        }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse::from(message.to_string())
    }
}

impl GatewayError {
    pub fn new(status: StatusCode, message: impl Into<HttpErrorResponse>) -> Self {
        GatewayError {
            status,
            message: message.into(),
        }
    }

    pub fn with_response(mut self, raw: impl Into<String>) -> Self {
        self.message.response = Some(raw.into());
        self
    }

    pub fn with_video_file(mut self, descriptor: Value) -> Self {
        self.message.video_file = Some(descriptor);
        self
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for GatewayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        // Alternate formatting keeps the whole cause chain, e.g. the OS error behind a failed connect
        GatewayError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(format!("{:#}", err.into())),
        }
    }
}

pub type GatewayResult<T, E = GatewayError> = Result<T, E>;

#[macro_export]
macro_rules! bail_gateway {
    ($error_message:expr) => {
        return Err($crate::error::GatewayError::new(
            ::axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            $error_message,
        ))
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::GatewayError::new($status_code, $error_message))
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::GatewayError::new($status, format!($fmt $(, $arg)*)))
    };
}
