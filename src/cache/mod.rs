//! Fetch-or-generate orchestration over the variant cache.
//!
//! For each request the orchestrator decides whether any work is needed at
//! all: an existing cache file is served as-is; otherwise the source image is
//! downloaded on demand and transformed, with at most one concurrent
//! generation per cache path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::naming::{self, VariantPaths};
use crate::negotiate::OutputFormat;
use crate::origin::{FetchError, OriginClient};
use crate::request::TransformRequest;
use crate::transform::{
    FitMode, TransformEngine, TransformError, TransformInfo, TransformSpec,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("origin fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

/// How a request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The variant already existed on disk.
    Hit(PathBuf),
    /// The variant was generated by this request.
    Generated(PathBuf),
}

impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Hit(p) | Self::Generated(p) => p,
        }
    }
}

/// Filesystem variant cache with single-flight generation.
pub struct VariantCache {
    source_dir: PathBuf,
    cache_dir: PathBuf,
    origin: OriginClient,
    engine: Arc<dyn TransformEngine>,
    fit: FitMode,
    /// In-flight generations keyed by cache path. Later requests for the
    /// same key await the lock instead of re-triggering generation.
    inflight: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl VariantCache {
    pub fn new(
        source_dir: PathBuf,
        cache_dir: PathBuf,
        origin: OriginClient,
        engine: Arc<dyn TransformEngine>,
        fit: FitMode,
    ) -> Self {
        Self {
            source_dir,
            cache_dir,
            origin,
            engine,
            fit,
            inflight: DashMap::new(),
        }
    }

    /// Derive the source and cache paths for a request.
    pub fn derive_paths(&self, req: &TransformRequest, format: OutputFormat) -> VariantPaths {
        naming::derive(&self.source_dir, &self.cache_dir, req, format)
    }

    /// Serve a variant from the cache, generating it on miss.
    ///
    /// On miss the source image is fetched from the origin if absent locally,
    /// then transformed into the cache file. Concurrent requests for the same
    /// cache path serialize on a per-key lock and re-check existence after
    /// acquiring it, so the variant is generated at most once.
    pub async fn get_or_generate(
        &self,
        req: &TransformRequest,
        format: OutputFormat,
    ) -> Result<Outcome, PipelineError> {
        let paths = self.derive_paths(req, format);

        if paths.cache.exists() {
            tracing::debug!("cache hit: {}", paths.cache.display());
            return Ok(Outcome::Hit(paths.cache));
        }

        let lock = self
            .inflight
            .entry(paths.cache.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent winner may have materialized the file while we waited.
        if paths.cache.exists() {
            tracing::debug!("cache hit after wait: {}", paths.cache.display());
            return Ok(Outcome::Hit(paths.cache));
        }

        let result = self.generate(req, format, &paths).await;
        self.inflight.remove(&paths.cache);

        result.map(|info| {
            tracing::info!(
                "generated {} ({}x{}, {} bytes)",
                paths.cache.display(),
                info.width,
                info.height,
                info.bytes,
            );
            Outcome::Generated(paths.cache)
        })
    }

    /// Run the pipeline unconditionally, ignoring an existing cache file.
    ///
    /// Diagnostic entry point: the source is still fetched on demand and the
    /// cache file is (re)written, but an existing variant does not
    /// short-circuit.
    pub async fn regenerate(
        &self,
        req: &TransformRequest,
        format: OutputFormat,
    ) -> Result<TransformInfo, PipelineError> {
        let paths = self.derive_paths(req, format);
        self.generate(req, format, &paths).await
    }

    async fn generate(
        &self,
        req: &TransformRequest,
        format: OutputFormat,
        paths: &VariantPaths,
    ) -> Result<TransformInfo, PipelineError> {
        if !paths.source.exists() {
            self.origin.fetch(&req.source_id, &paths.source).await?;
        }

        let spec = TransformSpec {
            width: req.width,
            height: req.height,
            quality: req.quality,
            format,
            fit: self.fit,
        };

        let info = self
            .engine
            .transform(&paths.source, &paths.cache, &spec)
            .await?;

        Ok(info)
    }
}
