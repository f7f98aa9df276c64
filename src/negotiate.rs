//! Output format negotiation from the client's `Accept` header.

use serde::{Deserialize, Serialize};

/// Output encoding for a generated variant.
///
/// `Jpeg` is the fallback for clients that do not advertise WebP support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// File extension used in cache filenames.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
        }
    }

    /// MIME type for the HTTP `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Choose the output format from an `Accept` header value.
///
/// A plain substring match on `image/webp`, not full MIME-grammar parsing.
/// Absent or malformed headers simply fall back to JPEG; this never fails.
pub fn negotiate(accept: Option<&str>) -> OutputFormat {
    match accept {
        Some(header) if header.contains("image/webp") => OutputFormat::Webp,
        _ => OutputFormat::Jpeg,
    }
}
