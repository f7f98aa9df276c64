//! Request parameter parsing.
//!
//! Turns a raw request path and query map into a normalized
//! [`TransformRequest`], substituting configured defaults for anything
//! absent or unparseable.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::TransformConfig;

/// Normalized transform parameters, derived once per inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    /// Final segment of the request path, directories stripped.
    pub source_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

/// Parse a raw request path and query into a [`TransformRequest`].
///
/// Long-form keys (`width`, `height`, `quality`) win over short-form
/// (`w`, `h`, `q`). A value that fails to parse, or is zero, counts as not
/// supplied and falls through to the configured default. Pure function,
/// never fails.
pub fn parse(
    raw_path: &str,
    raw_query: &HashMap<String, String>,
    defaults: &TransformConfig,
) -> TransformRequest {
    let source_id = raw_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
        .to_string();

    let width = dim_param(raw_query, "width")
        .or_else(|| dim_param(raw_query, "w"))
        .or(defaults.default_width);
    let height = dim_param(raw_query, "height")
        .or_else(|| dim_param(raw_query, "h"))
        .or(defaults.default_height);
    let quality = quality_param(raw_query, "quality")
        .or_else(|| quality_param(raw_query, "q"))
        .or(defaults.default_quality);

    TransformRequest {
        source_id,
        width,
        height,
        quality,
    }
}

/// Zero is treated as not supplied, matching the defaulting chain of the
/// naming scheme (a zero dimension would otherwise drop its token).
fn dim_param(query: &HashMap<String, String>, key: &str) -> Option<u32> {
    query
        .get(key)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v != 0)
}

fn quality_param(query: &HashMap<String, String>, key: &str) -> Option<u8> {
    query
        .get(key)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|v| *v != 0)
}
