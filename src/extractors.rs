use std::io;
use std::path::PathBuf;

use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Request};
use serde::Serialize;
use serde_json::Value;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::GatewayError;

/// Multipart keys accepted for the uploaded video, in order of preference.
pub const FILE_FIELDS: [&str; 2] = ["file", "video"];

/// A multipart upload spooled to a temporary file.
///
/// The temporary file lives as long as the descriptor and is removed on drop.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub field_name: String,
    pub original_filename: Option<String>,
    pub mimetype: Option<String>,
    pub size: u64,
    pub filepath: PathBuf,
    #[serde(skip)]
    _temp: Option<TempPath>,
}

impl UploadedFile {
    /// Opens the spooled file for streaming. Fails when the path is gone or is not a regular file.
    pub async fn open(&self) -> io::Result<File> {
        let metadata = tokio::fs::metadata(&self.filepath).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", self.filepath.display()),
            ));
        }
        File::open(&self.filepath).await
    }

    /// Descriptor for a file that is not owned by the request, e.g. one already removed.
    #[cfg(test)]
    pub(crate) fn at_path(field_name: &str, filepath: PathBuf) -> Self {
        UploadedFile {
            field_name: field_name.to_string(),
            original_filename: None,
            mimetype: None,
            size: 0,
            filepath,
            _temp: None,
        }
    }

    /// JSON echo of the descriptor used in error bodies.
    pub fn descriptor(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Optional string parameters of a video detection request.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VideoParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub fps: Option<String>,
    pub rich: Option<String>,
}

impl VideoParams {
    /// Form fields in upstream order, with empty or missing values replaced by their defaults.
    pub fn with_defaults(&self) -> [(&'static str, String); 4] {
        fn or(value: &Option<String>, default: &str) -> String {
            match value.as_deref() {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => default.to_string(),
            }
        }
        [
            ("startTime", or(&self.start_time, "0")),
            ("endTime", or(&self.end_time, "0")),
            ("fps", or(&self.fps, "24")),
            ("rich", or(&self.rich, "false")),
        ]
    }

    fn slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "startTime" => Some(&mut self.start_time),
            "endTime" => Some(&mut self.end_time),
            "fps" => Some(&mut self.fps),
            "rich" => Some(&mut self.rich),
            _ => None,
        }
    }
}

/// Parsed `multipart/form-data` body of a video detection request.
#[derive(Debug)]
pub struct VideoUploadForm {
    pub file: Option<UploadedFile>,
    pub params: VideoParams,
}

#[async_trait]
impl<S> FromRequest<S> for VideoUploadForm
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state).await?;
        let mut uploads: [Option<UploadedFile>; 2] = [None, None];
        let mut params = VideoParams::default();

        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let slot = FILE_FIELDS.iter().position(|key| *key == name);

            match (slot, field.file_name().map(str::to_string)) {
                (Some(slot), Some(original_filename)) => {
                    let mimetype = field.content_type().map(str::to_string);
                    let (file, temp) = tempfile::Builder::new()
                        .prefix("detect-upload-")
                        .tempfile()?
                        .into_parts();
                    let mut file = File::from_std(file);
                    let mut size = 0u64;
                    while let Some(chunk) = field.chunk().await? {
                        file.write_all(&chunk).await?;
                        size += chunk.len() as u64;
                    }
                    file.flush().await?;
                    debug!(field = %name, size, "Spooled upload to {}", temp.display());

                    uploads[slot] = Some(UploadedFile {
                        field_name: name,
                        original_filename: Some(original_filename),
                        mimetype,
                        size,
                        filepath: temp.to_path_buf(),
                        _temp: Some(temp),
                    });
                }
                _ => {
                    if let Some(slot) = params.slot(&name) {
                        *slot = Some(field.text().await?);
                    }
                }
            }
        }

        let [file, video] = uploads;
        Ok(VideoUploadForm {
            file: file.or(video),
            params,
        })
    }
}
