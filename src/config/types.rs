use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transform::{FitMode, JpegEncodeOptions, WebpEncodeOptions};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Route prefix for the primary pipeline, e.g. `/img`.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_route_prefix() -> String {
    "/img".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            route_prefix: default_route_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Base URL source images are fetched from when absent locally.
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Content types accepted from the origin. Empty list allows everything.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
        "image/gif".to_string(),
    ]
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: default_request_timeout(),
            allowed_types: default_allowed_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding downloaded source images.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Directory holding generated variants.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./originals")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Default target width when the request carries none. Absent means the
    /// natural width of the source image.
    #[serde(default)]
    pub default_width: Option<u32>,

    /// Default target height when the request carries none.
    #[serde(default)]
    pub default_height: Option<u32>,

    /// Default quality when the request carries none.
    #[serde(default = "default_quality")]
    pub default_quality: Option<u8>,

    /// Resize strategy when both dimensions are given.
    #[serde(default)]
    pub fit: FitMode,

    #[serde(default)]
    pub webp: WebpEncodeOptions,

    #[serde(default)]
    pub jpeg: JpegEncodeOptions,
}

fn default_quality() -> Option<u8> {
    Some(100)
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            default_width: None,
            default_height: None,
            default_quality: default_quality(),
            fit: FitMode::default(),
            webp: WebpEncodeOptions::default(),
            jpeg: JpegEncodeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Request path under `/tmp/*` whose generated file is streamed back
    /// instead of the diagnostics payload (internal smoke test).
    #[serde(default)]
    pub smoke_path: Option<String>,
}
