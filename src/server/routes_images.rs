//! Image pipeline and diagnostic routes.
//!
//! The primary route streams cached or freshly generated variants; failures
//! carry a diagnostics JSON body describing everything the pipeline derived
//! for the request, with the failure class mapped to a real HTTP status.

use std::collections::HashMap;
use std::path::Path;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use super::AppContext;
use crate::cache::PipelineError;
use crate::naming::VariantPaths;
use crate::negotiate::{self, OutputFormat};
use crate::origin::FetchError;
use crate::request::{self, TransformRequest};

/// Liveness check.
pub async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "pong": true }))
}

/// Everything the pipeline derived for a request, reported on failures and
/// from the diagnostic route. Wire field names kept stable for external
/// tooling.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Diagnostics<'a> {
    path: &'a str,
    query: Option<&'a str>,
    headers: Option<&'a str>,
    req_img: &'a TransformRequest,
    source_filename: String,
    dest_filename: String,
    is_file_exists: bool,
    img_results: bool,
}

impl<'a> Diagnostics<'a> {
    fn new(
        uri: &'a Uri,
        accept: Option<&'a str>,
        req: &'a TransformRequest,
        paths: &VariantPaths,
        img_results: bool,
    ) -> Self {
        Self {
            path: uri.path(),
            query: uri.query(),
            headers: accept,
            req_img: req,
            source_filename: paths.source.display().to_string(),
            dest_filename: paths.cache.display().to_string(),
            is_file_exists: paths.source.exists(),
            img_results,
        }
    }
}

/// Primary pipeline: serve the cached variant, generating it on miss.
pub async fn serve_variant(
    State(ctx): State<AppContext>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let accept = accept_header(&headers);
    let req = request::parse(uri.path(), &params, &ctx.config.transform);
    let format = negotiate::negotiate(accept);

    match ctx.cache.get_or_generate(&req, format).await {
        Ok(outcome) => stream_file(outcome.path(), format).await,
        Err(e) => {
            tracing::warn!("pipeline failed for {}: {}", uri.path(), e);
            let paths = ctx.cache.derive_paths(&req, format);
            let body = Diagnostics::new(&uri, accept, &req, &paths, false);
            (failure_status(&e), Json(body)).into_response()
        }
    }
}

/// Diagnostic pipeline: always recomputes (ignoring the cache check) and
/// reports the full derivation. Streams the generated file instead of the
/// report only on the configured smoke-test path.
pub async fn diagnose(
    State(ctx): State<AppContext>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let accept = accept_header(&headers);
    let req = request::parse(uri.path(), &params, &ctx.config.transform);
    let format = negotiate::negotiate(accept);
    let paths = ctx.cache.derive_paths(&req, format);

    let result = ctx.cache.regenerate(&req, format).await;
    if let Err(ref e) = result {
        tracing::warn!("diagnostic pipeline failed for {}: {}", uri.path(), e);
    }

    let is_smoke_path = ctx
        .config
        .diagnostics
        .smoke_path
        .as_deref()
        .is_some_and(|smoke| smoke == uri.path());
    if result.is_ok() && is_smoke_path {
        return stream_file(&paths.cache, format).await;
    }

    let body = Diagnostics::new(&uri, accept, &req, &paths, result.is_ok());
    (StatusCode::OK, Json(body)).into_response()
}

fn accept_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ACCEPT).and_then(|v| v.to_str().ok())
}

fn failure_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Fetch(FetchError::NotFound { .. }) => StatusCode::NOT_FOUND,
        PipelineError::Fetch(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Stream a cache file back as the response body.
async fn stream_file(path: &Path, format: OutputFormat) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to open cache file {}: {}", path.display(), e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Cache file not readable"})),
            )
                .into_response();
        }
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type()),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable",
            ),
        ],
        body,
    )
        .into_response()
}
