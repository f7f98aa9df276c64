//! Image transform engine: decode, resize, re-encode.
//!
//! The [`TransformEngine`] trait is the seam between the cache orchestrator
//! and the actual pixel work, so tests can substitute a counting stub.
//! [`ImageEngine`] is the real implementation built on the `image` crate for
//! decoding, resizing and JPEG encoding, and the `webp` crate for lossy
//! quality-controlled WebP encoding.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::negotiate::OutputFormat;

/// Resize strategy when both target dimensions are given and the aspect
/// ratio differs from the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fill the target box, cropping overflow.
    #[default]
    Cover,
    /// Fit inside the target box, preserving aspect ratio.
    Contain,
    /// Stretch to the exact target dimensions.
    Fill,
}

/// Encode options for WebP output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebpEncodeOptions {
    /// Quality used when the request does not carry one.
    #[serde(default = "default_encode_quality")]
    pub quality: u8,

    /// Encode losslessly, ignoring quality.
    #[serde(default)]
    pub lossless: bool,
}

impl Default for WebpEncodeOptions {
    fn default() -> Self {
        Self {
            quality: default_encode_quality(),
            lossless: false,
        }
    }
}

/// Encode options for JPEG output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JpegEncodeOptions {
    /// Quality used when the request does not carry one.
    #[serde(default = "default_encode_quality")]
    pub quality: u8,
}

impl Default for JpegEncodeOptions {
    fn default() -> Self {
        Self {
            quality: default_encode_quality(),
        }
    }
}

fn default_encode_quality() -> u8 {
    80
}

/// Resolved options for a single transform operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub format: OutputFormat,
    pub fit: FitMode,
}

/// Metadata about a completed transform, for logging.
#[derive(Debug, Clone)]
pub struct TransformInfo {
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("source image not found: {0}")]
    MissingSource(PathBuf),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode as {format}: {message}")]
    Encode { format: OutputFormat, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transform task failed: {0}")]
    Task(String),
}

/// Produces an encoded variant at `dest` from the image at `source`.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn transform(
        &self,
        source: &Path,
        dest: &Path,
        spec: &TransformSpec,
    ) -> Result<TransformInfo, TransformError>;
}

/// Real transform engine backed by the `image` and `webp` crates.
pub struct ImageEngine {
    webp: WebpEncodeOptions,
    jpeg: JpegEncodeOptions,
}

impl ImageEngine {
    pub fn new(webp: WebpEncodeOptions, jpeg: JpegEncodeOptions) -> Self {
        Self { webp, jpeg }
    }
}

#[async_trait]
impl TransformEngine for ImageEngine {
    async fn transform(
        &self,
        source: &Path,
        dest: &Path,
        spec: &TransformSpec,
    ) -> Result<TransformInfo, TransformError> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        let spec = spec.clone();
        let webp = self.webp.clone();
        let jpeg = self.jpeg.clone();

        // Decode/resize/encode is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || transform_blocking(&source, &dest, &spec, &webp, &jpeg))
            .await
            .map_err(|e| TransformError::Task(e.to_string()))?
    }
}

fn transform_blocking(
    source: &Path,
    dest: &Path,
    spec: &TransformSpec,
    webp: &WebpEncodeOptions,
    jpeg: &JpegEncodeOptions,
) -> Result<TransformInfo, TransformError> {
    if !source.exists() {
        return Err(TransformError::MissingSource(source.to_path_buf()));
    }

    let data = std::fs::read(source).map_err(|e| TransformError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;

    let img = image::load_from_memory(&data).map_err(|e| TransformError::Decode {
        path: source.to_path_buf(),
        source: e,
    })?;

    let resized = apply_resize(img, spec);
    let encoded = encode(&resized, spec, webp, jpeg)?;

    write_atomic(dest, &encoded)?;

    Ok(TransformInfo {
        width: resized.width(),
        height: resized.height(),
        bytes: encoded.len() as u64,
    })
}

/// Resize according to the requested dimensions and fit mode.
///
/// A missing dimension means "no constraint on that axis": with neither
/// dimension the image passes through untouched, with one dimension the
/// aspect ratio is preserved.
fn apply_resize(img: DynamicImage, spec: &TransformSpec) -> DynamicImage {
    match (spec.width, spec.height) {
        (None, None) => img,
        (Some(w), None) => img.resize(w, u32::MAX, FilterType::Lanczos3),
        (None, Some(h)) => img.resize(u32::MAX, h, FilterType::Lanczos3),
        (Some(w), Some(h)) => match spec.fit {
            FitMode::Cover => img.resize_to_fill(w, h, FilterType::Lanczos3),
            FitMode::Contain => img.resize(w, h, FilterType::Lanczos3),
            FitMode::Fill => img.resize_exact(w, h, FilterType::Lanczos3),
        },
    }
}

fn encode(
    img: &DynamicImage,
    spec: &TransformSpec,
    webp: &WebpEncodeOptions,
    jpeg: &JpegEncodeOptions,
) -> Result<Vec<u8>, TransformError> {
    match spec.format {
        OutputFormat::Jpeg => {
            let quality = spec.quality.unwrap_or(jpeg.quality);
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let mut buf = Cursor::new(Vec::new());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| TransformError::Encode {
                    format: OutputFormat::Jpeg,
                    message: e.to_string(),
                })?;
            Ok(buf.into_inner())
        }
        OutputFormat::Webp => {
            let quality = spec.quality.unwrap_or(webp.quality);
            let rgba = img.to_rgba8();
            let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
            let memory = if webp.lossless {
                encoder.encode_lossless()
            } else {
                encoder.encode(f32::from(quality))
            };
            Ok(memory.to_vec())
        }
    }
}

/// Write the encoded bytes to a uniquely named temp file in the destination
/// directory, then rename into place. The destination is either absent or
/// fully valid, never partially written.
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), TransformError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| TransformError::Io { path, source: e }
    };

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dest.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()));

    std::fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(TransformError::Io {
            path: dest.to_path_buf(),
            source: e,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(
        width: Option<u32>,
        height: Option<u32>,
        format: OutputFormat,
        fit: FitMode,
    ) -> TransformSpec {
        TransformSpec {
            width,
            height,
            quality: Some(80),
            format,
            fit,
        }
    }

    fn test_image(width: u32, height: u32) -> DynamicImage {
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([0, 128, 255]);
        }
        DynamicImage::ImageRgb8(img)
    }

    fn write_jpeg(path: &Path, width: u32, height: u32) {
        let mut buf = Cursor::new(Vec::new());
        test_image(width, height)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        std::fs::write(path, buf.into_inner()).unwrap();
    }

    #[test]
    fn resize_passthrough_without_dimensions() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(None, None, OutputFormat::Jpeg, FitMode::Cover),
        );
        assert_eq!((out.width(), out.height()), (40, 30));
    }

    #[test]
    fn resize_width_only_preserves_aspect() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(Some(20), None, OutputFormat::Jpeg, FitMode::Cover),
        );
        assert_eq!((out.width(), out.height()), (20, 15));
    }

    #[test]
    fn resize_height_only_preserves_aspect() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(None, Some(15), OutputFormat::Jpeg, FitMode::Cover),
        );
        assert_eq!((out.width(), out.height()), (20, 15));
    }

    #[test]
    fn resize_cover_fills_target_box() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(Some(10), Some(10), OutputFormat::Jpeg, FitMode::Cover),
        );
        assert_eq!((out.width(), out.height()), (10, 10));
    }

    #[test]
    fn resize_contain_fits_inside_target_box() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(Some(10), Some(10), OutputFormat::Jpeg, FitMode::Contain),
        );
        // Constrained by width, aspect preserved
        assert_eq!((out.width(), out.height()), (10, 7));
    }

    #[test]
    fn resize_fill_stretches() {
        let out = apply_resize(
            test_image(40, 30),
            &spec(Some(10), Some(25), OutputFormat::Jpeg, FitMode::Fill),
        );
        assert_eq!((out.width(), out.height()), (10, 25));
    }

    #[test]
    fn encode_jpeg_magic_bytes() {
        let bytes = encode(
            &test_image(4, 4),
            &spec(None, None, OutputFormat::Jpeg, FitMode::Cover),
            &WebpEncodeOptions::default(),
            &JpegEncodeOptions::default(),
        )
        .unwrap();
        assert!(bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn encode_webp_magic_bytes() {
        let bytes = encode(
            &test_image(4, 4),
            &spec(None, None, OutputFormat::Webp, FitMode::Cover),
            &WebpEncodeOptions::default(),
            &JpegEncodeOptions::default(),
        )
        .unwrap();
        assert!(bytes.starts_with(b"RIFF"));
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn engine_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ImageEngine::new(WebpEncodeOptions::default(), JpegEncodeOptions::default());
        let err = engine
            .transform(
                &dir.path().join("nope.jpg"),
                &dir.path().join("out.jpeg"),
                &spec(Some(10), None, OutputFormat::Jpeg, FitMode::Cover),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingSource(_)));
    }

    #[tokio::test]
    async fn engine_corrupt_source_fails_decode() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bad.jpg");
        std::fs::write(&source, b"definitely not an image").unwrap();
        let engine = ImageEngine::new(WebpEncodeOptions::default(), JpegEncodeOptions::default());
        let err = engine
            .transform(
                &source,
                &dir.path().join("out.jpeg"),
                &spec(Some(10), None, OutputFormat::Jpeg, FitMode::Cover),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode { .. }));
    }

    #[tokio::test]
    async fn engine_writes_resized_webp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jpg");
        write_jpeg(&source, 40, 30);

        let dest = dir.path().join("out.webp");
        let engine = ImageEngine::new(WebpEncodeOptions::default(), JpegEncodeOptions::default());
        let info = engine
            .transform(
                &source,
                &dest,
                &spec(Some(20), None, OutputFormat::Webp, FitMode::Cover),
            )
            .await
            .unwrap();

        assert_eq!((info.width, info.height), (20, 15));
        let written = std::fs::read(&dest).unwrap();
        assert_eq!(info.bytes, written.len() as u64);
        assert!(written.starts_with(b"RIFF"));

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
