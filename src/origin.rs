//! Streaming downloads of source images from the remote origin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::header;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::OriginConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("origin has no such image: {url}")]
    NotFound { url: String },

    #[error("origin returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("origin sent unsupported content type {content_type:?} for {url}")]
    ContentType { content_type: String, url: String },

    #[error("failed writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// HTTP client for the configured origin.
pub struct OriginClient {
    client: reqwest::Client,
    base_url: String,
    allowed_types: Vec<String>,
}

impl OriginClient {
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build origin HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            allowed_types: config.allowed_types.clone(),
        })
    }

    /// Download a source image to `destination`.
    ///
    /// The caller has already verified `destination` does not exist. The body
    /// is streamed to a uniquely named temp file in the destination directory
    /// and renamed into place only after the stream completes, so the
    /// destination is either absent or fully valid.
    pub async fn fetch(&self, source_id: &str, destination: &Path) -> Result<(), FetchError> {
        let url = format!("{}/{}", self.base_url, source_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { url });
        }
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();
        if !self.allowed_types.is_empty() && !self.allowed_types.contains(&content_type) {
            return Err(FetchError::ContentType { content_type, url });
        }

        let content_length = response.content_length();

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FetchError::Io {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = destination.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()));

        if let Err(e) = stream_body(response, &tmp, &url).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, destination)
            .await
            .map_err(|e| FetchError::Io {
                path: destination.to_path_buf(),
                source: e,
            })?;

        tracing::info!(
            "download complete {} -> {} ({} bytes, {})",
            url,
            destination.display(),
            content_length.unwrap_or(0),
            content_type,
        );

        Ok(())
    }
}

async fn stream_body(response: reqwest::Response, tmp: &Path, url: &str) -> Result<(), FetchError> {
    let io_err = |e: std::io::Error| FetchError::Io {
        path: tmp.to_path_buf(),
        source: e,
    };

    let mut file = tokio::fs::File::create(tmp).await.map_err(io_err)?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
    }

    file.flush().await.map_err(io_err)?;
    Ok(())
}
