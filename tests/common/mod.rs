//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use imagegate::transform::{TransformEngine, TransformError, TransformInfo, TransformSpec};

/// Encode a solid-color JPEG of the given size in memory.
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut img = image::RgbImage::new(width, height);
    for pixel in img.pixels_mut() {
        *pixel = image::Rgb([200, 60, 20]);
    }
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// Transform engine spy: records every invocation and writes marker bytes
/// instead of doing pixel work.
pub struct StubEngine {
    pub calls: AtomicUsize,
    pub specs: Mutex<Vec<TransformSpec>>,
    pub delay: Duration,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            specs: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_spec(&self) -> Option<TransformSpec> {
        self.specs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TransformEngine for StubEngine {
    async fn transform(
        &self,
        source: &Path,
        dest: &Path,
        spec: &TransformSpec,
    ) -> Result<TransformInfo, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if !source.exists() {
            return Err(TransformError::MissingSource(source.to_path_buf()));
        }

        let bytes = b"stub variant bytes";
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|e| TransformError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;

        Ok(TransformInfo {
            width: spec.width.unwrap_or(1),
            height: spec.height.unwrap_or(1),
            bytes: bytes.len() as u64,
        })
    }
}

/// Transform engine that always fails with an encode error.
pub struct FailingEngine;

#[async_trait]
impl TransformEngine for FailingEngine {
    async fn transform(
        &self,
        _source: &Path,
        _dest: &Path,
        spec: &TransformSpec,
    ) -> Result<TransformInfo, TransformError> {
        Err(TransformError::Encode {
            format: spec.format,
            message: "stub encode failure".to_string(),
        })
    }
}
