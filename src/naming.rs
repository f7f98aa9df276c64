//! Deterministic source and cache path derivation.
//!
//! The whole caching scheme rests on this module: the same request tuple
//! must always produce the same cache filename, and tuples differing in any
//! of width/height/quality/format must never collide.

use std::path::{Path, PathBuf};

use crate::negotiate::OutputFormat;
use crate::request::TransformRequest;

/// Filesystem paths derived for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPaths {
    /// The canonical unscaled original, shared by all variants of a source.
    pub source: PathBuf,
    /// The variant file, unique per (source, width, height, quality, format).
    pub cache: PathBuf,
}

/// Derive the source and cache paths for a request.
///
/// The source filename is the base name of `source_id`, directory components
/// stripped; nested assets with the same base name therefore collide (a known
/// limitation of the naming scheme). The cache filename is
/// `{stem}{_w<width>_}{_h<height>_}{q<quality>.|.}{ext}`.
///
/// Pure and total; never fails.
pub fn derive(
    source_dir: &Path,
    cache_dir: &Path,
    req: &TransformRequest,
    format: OutputFormat,
) -> VariantPaths {
    let base = Path::new(&req.source_id)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = Path::new(&base)
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let width = req.width.map(|w| format!("_w{w}_")).unwrap_or_default();
    let height = req.height.map(|h| format!("_h{h}_")).unwrap_or_default();
    let quality = match req.quality {
        Some(q) => format!("q{q}."),
        None => ".".to_string(),
    };

    let cache_name = format!("{stem}{width}{height}{quality}{}", format.extension());

    VariantPaths {
        source: source_dir.join(base),
        cache: cache_dir.join(cache_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn req(
        source_id: &str,
        width: Option<u32>,
        height: Option<u32>,
        quality: Option<u8>,
    ) -> TransformRequest {
        TransformRequest {
            source_id: source_id.to_string(),
            width,
            height,
            quality,
        }
    }

    fn derive_name(r: &TransformRequest, format: OutputFormat) -> String {
        derive(Path::new("/src"), Path::new("/cache"), r, format)
            .cache
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn full_tuple() {
        let name = derive_name(
            &req("foo.jpg", Some(100), Some(50), Some(80)),
            OutputFormat::Webp,
        );
        assert_eq!(name, "foo_w100__h50_q80.webp");
    }

    #[test]
    fn width_and_quality_only() {
        let name = derive_name(&req("foo.jpg", Some(100), None, Some(80)), OutputFormat::Webp);
        assert_eq!(name, "foo_w100_q80.webp");
    }

    #[test]
    fn no_parameters_yields_bare_dot() {
        let name = derive_name(&req("foo.jpg", None, None, None), OutputFormat::Jpeg);
        assert_eq!(name, "foo.jpeg");
    }

    #[test]
    fn source_path_keeps_extension() {
        let paths = derive(
            Path::new("/src"),
            Path::new("/cache"),
            &req("foo.jpg", Some(100), None, Some(80)),
            OutputFormat::Webp,
        );
        assert_eq!(paths.source, Path::new("/src/foo.jpg"));
    }

    #[test]
    fn directories_are_stripped() {
        let paths = derive(
            Path::new("/src"),
            Path::new("/cache"),
            &req("nested/dir/foo.jpg", Some(10), None, Some(80)),
            OutputFormat::Jpeg,
        );
        assert_eq!(paths.source, Path::new("/src/foo.jpg"));
        assert_eq!(paths.cache, Path::new("/cache/foo_w10_q80.jpeg"));
    }

    #[test]
    fn deterministic_across_calls() {
        let r = req("foo.jpg", Some(640), Some(480), Some(90));
        let a = derive(Path::new("/s"), Path::new("/c"), &r, OutputFormat::Webp);
        let b = derive(Path::new("/s"), Path::new("/c"), &r, OutputFormat::Webp);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_tuples_never_collide() {
        let variants = [
            (Some(100), Some(50), Some(80), OutputFormat::Webp),
            (Some(100), Some(50), Some(80), OutputFormat::Jpeg),
            (Some(100), Some(50), Some(81), OutputFormat::Webp),
            (Some(100), Some(51), Some(80), OutputFormat::Webp),
            (Some(101), Some(50), Some(80), OutputFormat::Webp),
            (Some(100), None, Some(80), OutputFormat::Webp),
            (None, Some(50), Some(80), OutputFormat::Webp),
            (None, None, Some(80), OutputFormat::Webp),
            (None, None, None, OutputFormat::Webp),
        ];

        let names: HashSet<String> = variants
            .iter()
            .map(|(w, h, q, f)| derive_name(&req("foo.jpg", *w, *h, *q), *f))
            .collect();
        assert_eq!(names.len(), variants.len());
    }
}
