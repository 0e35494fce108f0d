//! In-memory raster surface: decode, scaled draw, pixel read-back, encode.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image::load_from_memory` |
//! | Scaled draw | `DynamicImage::resize_exact` with `Triangle` (bilinear) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality 1–100) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (quality ignored) |
//! | Encode → WebP | `webp` (libwebp, lossy) with the default `lossy-webp` feature |
//! | Encode → WebP (no `lossy-webp`) | `image::codecs::webp::WebPEncoder` (lossless) |

use crate::strategy::PipelineError;
use crate::types::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use std::sync::LazyLock;

/// Whether WebP output honours the quality setting.
pub const LOSSY_WEBP: bool = cfg!(feature = "lossy-webp");

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Decode an encoded buffer into an image handle.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("image buffer is empty".into()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| PipelineError::Decode(format!("failed to decode image: {}", e)))
}

/// Best-effort MIME type sniffed from the buffer's magic bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|f| f.to_mime_type().to_string())
}

/// Draw `img` into a fresh surface of exactly `width`×`height`.
///
/// The surface does its own bilinear scaling in one pass. When the size is
/// unchanged the image is returned as-is.
pub fn draw_scaled(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        return img;
    }
    img.resize_exact(width, height, FilterType::Triangle)
}

/// Read back the full RGBA pixel buffer of an image.
pub fn read_pixels(img: &DynamicImage) -> (Vec<u8>, u32, u32) {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    (rgba.into_raw(), width, height)
}

/// Wrap a raw RGBA buffer back into an image handle.
pub fn from_pixels(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
) -> Result<DynamicImage, PipelineError> {
    RgbaImage::from_raw(width, height, pixels)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| {
            PipelineError::Decode(format!(
                "pixel buffer does not match {}x{} RGBA",
                width, height
            ))
        })
}

/// Map a `[0, 1]` quality onto the 1–100 scale used by the encoders.
pub fn encoder_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode an image to `format`.
///
/// Fails with a surface error when the encoder errors or yields nothing.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, PipelineError> {
    let surface_error =
        |e: String| PipelineError::Surface(format!("{} encode failed: {}", format, e));
    let buf = match format {
        OutputFormat::Jpeg | OutputFormat::Jpg => {
            let mut buf = Vec::new();
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, encoder_quality(quality))
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| surface_error(e.to_string()))?;
            buf
        }
        OutputFormat::Png => {
            let mut buf = Vec::new();
            let rgba = img.to_rgba8();
            PngEncoder::new(&mut buf)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| surface_error(e.to_string()))?;
            buf
        }
        OutputFormat::WebP => encode_webp(img, quality).map_err(surface_error)?,
    };

    if buf.is_empty() {
        return Err(PipelineError::Surface(format!(
            "{} encoder produced an empty buffer",
            format
        )));
    }
    Ok(buf)
}

#[cfg(feature = "lossy-webp")]
const WEBP_MAX_EDGE: u32 = 16383;

#[cfg(feature = "lossy-webp")]
fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, String> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 || width > WEBP_MAX_EDGE || height > WEBP_MAX_EDGE {
        return Err(format!(
            "{}x{} is outside 1..={} per edge",
            width, height, WEBP_MAX_EDGE
        ));
    }
    webp::Encoder::from_rgba(rgba.as_raw(), width, height)
        .encode_simple(false, quality.clamp(0.0, 1.0) * 100.0)
        .map(|memory| memory.to_vec())
        .map_err(|e| format!("{:?}", e))
}

#[cfg(not(feature = "lossy-webp"))]
fn encode_webp(img: &DynamicImage, _quality: f32) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let rgba = img.to_rgba8();
    image::codecs::webp::WebPEncoder::new_lossless(&mut buf)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

/// Check that `bytes` starts with the container signature of `format`.
pub fn has_format_tag(bytes: &[u8], format: OutputFormat) -> bool {
    match format {
        OutputFormat::Jpeg | OutputFormat::Jpg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        OutputFormat::Png => bytes.starts_with(&[0x89, b'P', b'N', b'G']),
        OutputFormat::WebP => {
            bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
        }
    }
}

/// Allocate a 1×1 surface, fill it, and try to encode it as `format`.
///
/// Returns `false` instead of an error on any failure.
pub fn trial_encode(format: OutputFormat) -> bool {
    let surface = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])));
    encode(&surface, format, 0.5)
        .map(|bytes| !bytes.is_empty() && has_format_tag(&bytes, format))
        .unwrap_or(false)
}
