use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use tokio::fs::File;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::extractors::{UploadedFile, VideoParams};

/// Client for the upstream detection API.
///
/// Cloning is cheap, the connection pool and credential are shared.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    image_url: Url,
    video_url: Url,
    api_key: Arc<str>,
}

/// Fully buffered upstream answer.
#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base = Url::parse(&config.upstream_url)
            .with_context(|| format!("Invalid upstream URL {}", config.upstream_url))?;
        let image_url = base
            .join(&config.image_path)
            .with_context(|| format!("Invalid image detection path {}", config.image_path))?;
        let video_url = base
            .join(&config.video_path)
            .with_context(|| format!("Invalid video detection path {}", config.video_path))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(UpstreamClient {
            http,
            image_url,
            video_url,
            api_key: config.api_key.as_str().into(),
        })
    }

    /// Forwards an image detection body unmodified.
    pub async fn detect_image(&self, body: Bytes) -> Result<UpstreamReply> {
        let started = Instant::now();
        let res = self
            .http
            .post(self.image_url.clone())
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        read_reply(res, started).await
    }

    /// Streams an uploaded video and its parameters as a new multipart body.
    pub async fn detect_video(
        &self,
        file: File,
        upload: &UploadedFile,
        params: &VideoParams,
    ) -> Result<UpstreamReply> {
        let length = file.metadata().await?.len();
        let file_name = upload.original_filename.clone().unwrap_or_else(|| {
            upload
                .filepath
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string())
        });

        let mut part = Part::stream_with_length(reqwest::Body::from(file), length).file_name(file_name);
        if let Some(mimetype) = &upload.mimetype {
            part = part
                .mime_str(mimetype)
                .with_context(|| format!("Invalid content type {mimetype} on uploaded file"))?;
        }

        let form = params
            .with_defaults()
            .into_iter()
            .fold(Form::new().part("file", part), |form, (name, value)| {
                form.text(name, value)
            });
        debug!(length, "Forwarding video upload");

        let started = Instant::now();
        let res = self
            .http
            .post(self.video_url.clone())
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;
        read_reply(res, started).await
    }
}

async fn read_reply(res: Response, started: Instant) -> Result<UpstreamReply> {
    let status = res.status();
    let url = res.url().clone();
    let body = res.bytes().await?;
    info!(
        %url,
        status = status.as_u16(),
        bytes = body.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Upstream replied"
    );
    Ok(UpstreamReply { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_against_base() {
        let mut config = Config::default();
        config.upstream_url = "http://127.0.0.1:9000".into();
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(
            client.image_url.as_str(),
            "http://127.0.0.1:9000/oracle/v1/34/detect-image"
        );
        assert_eq!(
            client.video_url.as_str(),
            "http://127.0.0.1:9000/oracle/v1/34/detect-video"
        );
    }

    #[test]
    fn invalid_base_is_rejected() {
        let mut config = Config::default();
        config.upstream_url = "not a url".into();
        assert!(UpstreamClient::new(&config).is_err());
    }
}
