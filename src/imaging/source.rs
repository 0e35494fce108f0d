//! Turning an [`ImageSource`] into bytes or pixels.
//!
//! String references are resolved here: base64 `data:` URLs are decoded,
//! `file://` URLs and bare paths are read from disk. Anything else (remote
//! URLs, non-base64 data URLs) is rejected as unsupported input.

use super::raster;
use crate::strategy::PipelineError;
use crate::types::ImageSource;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use std::path::Path;

/// Encoded bytes obtained from a source, with the MIME type if known.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Resolve a string reference to its encoded bytes.
pub fn resolve_reference(reference: &str) -> Result<Materialized, PipelineError> {
    if let Some(rest) = reference.strip_prefix("data:") {
        return decode_data_url(rest);
    }
    if let Some(path) = reference.strip_prefix("file://") {
        return read_path(Path::new(path));
    }
    if let Some((scheme, _)) = reference.split_once("://") {
        return Err(PipelineError::UnsupportedInput(format!(
            "`{}` references are not supported",
            scheme
        )));
    }
    read_path(Path::new(reference))
}

fn decode_data_url(rest: &str) -> Result<Materialized, PipelineError> {
    let (meta, payload) = rest.split_once(',').ok_or_else(|| {
        PipelineError::Decode("malformed data URL: missing ',' separator".into())
    })?;
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(PipelineError::UnsupportedInput(
            "only base64 data URLs are supported".into(),
        ));
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| PipelineError::Decode(format!("invalid base64 in data URL: {}", e)))?;
    Ok(Materialized {
        bytes,
        mime_type: (!mime.is_empty()).then(|| mime.to_string()),
    })
}

fn read_path(path: &Path) -> Result<Materialized, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Decode(format!("failed to read {}: {}", path.display(), e)))?;
    let mime_type = raster::sniff_mime_type(&bytes);
    Ok(Materialized { bytes, mime_type })
}

/// Encoded bytes of a source, or `None` for an already-decoded image.
pub fn materialize(source: &ImageSource) -> Result<Option<Materialized>, PipelineError> {
    match source {
        ImageSource::File {
            bytes, mime_type, ..
        }
        | ImageSource::Bytes { bytes, mime_type } => Ok(Some(Materialized {
            bytes: bytes.clone(),
            mime_type: mime_type.clone().or_else(|| raster::sniff_mime_type(bytes)),
        })),
        ImageSource::Reference(reference) => resolve_reference(reference).map(Some),
        ImageSource::Decoded(_) => Ok(None),
    }
}

/// Decode any source into an image handle on the calling thread.
pub fn decode_source(source: &ImageSource) -> Result<DynamicImage, PipelineError> {
    match source {
        ImageSource::File { bytes, .. } | ImageSource::Bytes { bytes, .. } => raster::decode(bytes),
        ImageSource::Reference(reference) => raster::decode(&resolve_reference(reference)?.bytes),
        ImageSource::Decoded(img) => Ok(img.clone()),
    }
}

/// Size of the source before compression, for statistics.
///
/// Data URLs are estimated from their length (base64 carries a 4/3
/// overhead); decoded images have no encoded size and report 0.
pub fn original_size(source: &ImageSource) -> u64 {
    match source {
        ImageSource::File { bytes, .. } | ImageSource::Bytes { bytes, .. } => bytes.len() as u64,
        ImageSource::Reference(reference) if reference.starts_with("data:") => {
            (reference.len() as f64 * 0.75).round() as u64
        }
        ImageSource::Reference(reference) => {
            let path = reference.strip_prefix("file://").unwrap_or(reference);
            std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
        }
        ImageSource::Decoded(_) => 0,
    }
}
