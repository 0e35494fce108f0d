//! Shared types passed between the selector, the strategies and the caller.
//!
//! Everything a strategy receives is bundled in a [`CompressionRequest`];
//! everything it hands back is a [`CompressionResult`]. The top-level API
//! enriches that result with [`CompressionStats`] and the [`Method`] that
//! serviced the call.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An image to compress, in one of the four shapes the strategies understand.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// File-like binary object that carries its own name.
    File {
        name: String,
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    /// Raw encoded bytes with no name.
    Bytes {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    /// A `data:` URL, a `file://` URL or a filesystem path.
    Reference(String),
    /// An image that is already decoded.
    Decoded(DynamicImage),
}

impl ImageSource {
    /// Convenience constructor for a named file held in memory.
    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::File {
            name: name.into(),
            bytes,
            mime_type: None,
        }
    }

    /// Convenience constructor for an anonymous byte buffer.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes {
            bytes,
            mime_type: None,
        }
    }

    /// Name of the source, when it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::File { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Short label for progress output.
    pub fn label(&self) -> String {
        match self {
            Self::File { name, .. } => name.clone(),
            Self::Bytes { bytes, .. } => format!("<{} bytes>", bytes.len()),
            Self::Reference(value) if value.starts_with("data:") => "<data url>".to_string(),
            Self::Reference(value) => value.clone(),
            Self::Decoded(img) => format!("<decoded {}x{}>", img.width(), img.height()),
        }
    }
}

/// Output container format.
///
/// `Jpg` and `Jpeg` produce identical bytes; they only differ in the
/// extension used for the derived filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Jpg,
    Png,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::WebP, Self::Jpeg, Self::Jpg, Self::Png];

    /// Parse a format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "webp" => Some(Self::WebP),
            "jpeg" => Some(Self::Jpeg),
            "jpg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpeg",
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg | Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Inverse of [`mime_type`](Self::mime_type). `image/jpeg` maps to `Jpeg`.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/webp" => Some(Self::WebP),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which strategy serviced (or should service) a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Decode, scale and encode on the calling thread.
    Canvas,
    /// Same pipeline on a persistent background thread.
    Worker,
    /// Hand the image to the delegated codec engine.
    Wasm,
    /// Manual nearest-neighbour resize, no reliance on surface scaling.
    Lightweight,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "canvas" => Some(Self::Canvas),
            "worker" => Some(Self::Worker),
            "wasm" => Some(Self::Wasm),
            "lightweight" => Some(Self::Lightweight),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canvas => "canvas",
            Self::Worker => "worker",
            Self::Wasm => "wasm",
            Self::Lightweight => "lightweight",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully validated options. Strategies may assume every field is well formed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Encoder quality in `[0, 1]`.
    pub quality: f32,
    pub format: OutputFormat,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub preferred_method: Option<Method>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            quality: 0.7,
            format: OutputFormat::WebP,
            max_width: None,
            max_height: None,
            preferred_method: None,
        }
    }
}

/// One unit of work for a strategy.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub source: ImageSource,
    pub options: CompressionOptions,
}

/// Output of a single strategy invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub encoded: Vec<u8>,
    pub filename: String,
    pub byte_size: usize,
}

impl CompressionResult {
    pub fn new(encoded: Vec<u8>, filename: String) -> Self {
        let byte_size = encoded.len();
        Self {
            encoded,
            filename,
            byte_size,
        }
    }
}

/// Before/after figures for one compression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Negative when the output grew.
    pub saved_bytes: i64,
    /// Rounded percentage of the original that was saved.
    pub compression_ratio: i64,
    /// Upper-cased format name, e.g. `WEBP`.
    pub format: String,
}

impl CompressionStats {
    pub fn new(original_size: u64, compressed_size: u64, format: OutputFormat) -> Self {
        let saved_bytes = original_size as i64 - compressed_size as i64;
        let compression_ratio = if original_size > 0 {
            (saved_bytes as f64 / original_size as f64 * 100.0).round() as i64
        } else {
            0
        };
        Self {
            original_size,
            compressed_size,
            saved_bytes,
            compression_ratio,
            format: format.extension().to_uppercase(),
        }
    }
}

/// What the top-level `compress` returns.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub result: CompressionResult,
    pub stats: CompressionStats,
    pub method: Method,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_is_case_insensitive() {
        assert_eq!(OutputFormat::parse("WebP"), Some(OutputFormat::WebP));
        assert_eq!(OutputFormat::parse("JPG"), Some(OutputFormat::Jpg));
        assert_eq!(OutputFormat::parse("gif"), None);
    }

    #[test]
    fn jpg_and_jpeg_share_mime_but_not_extension() {
        assert_eq!(OutputFormat::Jpg.mime_type(), OutputFormat::Jpeg.mime_type());
        assert_eq!(OutputFormat::Jpg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpeg");
    }

    #[test]
    fn method_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Method::Lightweight).unwrap(), "\"lightweight\"");
        assert_eq!(serde_json::to_string(&OutputFormat::WebP).unwrap(), "\"webp\"");
    }

    #[test]
    fn stats_report_savings() {
        let stats = CompressionStats::new(1000, 250, OutputFormat::WebP);
        assert_eq!(stats.saved_bytes, 750);
        assert_eq!(stats.compression_ratio, 75);
        assert_eq!(stats.format, "WEBP");
    }

    #[test]
    fn stats_handle_growth_and_unknown_original() {
        let grown = CompressionStats::new(100, 150, OutputFormat::Png);
        assert_eq!(grown.saved_bytes, -50);
        assert_eq!(grown.compression_ratio, -50);

        let unknown = CompressionStats::new(0, 150, OutputFormat::Jpeg);
        assert_eq!(unknown.compression_ratio, 0);
        assert_eq!(unknown.saved_bytes, -150);
    }

    #[test]
    fn result_tracks_byte_size() {
        let result = CompressionResult::new(vec![1, 2, 3], "a.webp".into());
        assert_eq!(result.byte_size, 3);
    }

    #[test]
    fn source_name_only_for_files() {
        assert_eq!(ImageSource::file("cat.png", vec![]).name(), Some("cat.png"));
        assert_eq!(ImageSource::bytes(vec![]).name(), None);
        assert_eq!(ImageSource::Reference("data:image/png;base64,AA".into()).label(), "<data url>");
    }
}
