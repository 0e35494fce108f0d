//! Shared test utilities: synthetic images, a fixed host environment and
//! engine loaders with controllable behaviour.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let req = request(ImageSource::bytes(png_bytes(40, 20)), OutputFormat::Png, Some(10), None);
//! let env = FixedEnvironment::new(Capabilities::all(), false);
//! let loader = FixedLoader::default();
//! ```

use crate::capabilities::{Capabilities, Environment};
use crate::engine::{CodecEngine, EngineError, EngineFile, EngineLoader, EngineOptions};
use crate::imaging::raster;
use crate::types::{CompressionOptions, CompressionRequest, ImageSource, OutputFormat};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =========================================================================
// Images
// =========================================================================

/// Opaque RGBA image with a smooth diagonal gradient.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 128, 255])
    });
    DynamicImage::ImageRgba8(img)
}

/// Deterministic pseudo-random pixels; compresses badly on purpose.
pub fn noise_image(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x9E37_79B9;
    let img = RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [a, b, c, _] = state.to_le_bytes();
        Rgba([a, b, c, 255])
    });
    DynamicImage::ImageRgba8(img)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    raster::encode(&gradient_image(width, height), OutputFormat::Png, 1.0).unwrap()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    raster::encode(&gradient_image(width, height), OutputFormat::Jpeg, 0.9).unwrap()
}

pub fn data_url(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// A request with default quality and no preferred method.
pub fn request(
    source: ImageSource,
    format: OutputFormat,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> CompressionRequest {
    CompressionRequest {
        source,
        options: CompressionOptions {
            format,
            max_width,
            max_height,
            ..CompressionOptions::default()
        },
    }
}

// =========================================================================
// Environment
// =========================================================================

/// Environment with canned answers that counts how often it is probed.
pub struct FixedEnvironment {
    capabilities: Capabilities,
    restrictive: bool,
    detections: AtomicUsize,
}

impl FixedEnvironment {
    pub fn new(capabilities: Capabilities, restrictive: bool) -> Self {
        Self {
            capabilities,
            restrictive,
            detections: AtomicUsize::new(0),
        }
    }

    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

impl Environment for FixedEnvironment {
    fn detect(&self) -> Capabilities {
        self.detections.fetch_add(1, Ordering::SeqCst);
        self.capabilities
    }

    fn has_restrictive_policy(&self) -> bool {
        self.restrictive
    }
}

// =========================================================================
// Engine
// =========================================================================

/// Loader that reports the engine as missing.
pub struct MissingEngineLoader;

impl EngineLoader for MissingEngineLoader {
    fn is_loadable(&self) -> bool {
        false
    }

    fn load(&self) -> Result<Arc<dyn CodecEngine>, String> {
        Err("engine not installed".into())
    }
}

/// Engine that records every call and echoes the input back.
/// Uses Mutex (not RefCell) so it is Sync and can cross threads.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<(EngineFile, EngineOptions)>>,
    fail_next: AtomicBool,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<(EngineFile, EngineOptions)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl CodecEngine for RecordingEngine {
    fn compress(
        &self,
        file: EngineFile,
        options: &EngineOptions,
    ) -> Result<EngineFile, EngineError> {
        self.calls.lock().unwrap().push((file.clone(), options.clone()));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Encode {
                mime_type: file.mime_type,
                reason: "injected failure".into(),
            });
        }
        Ok(file)
    }
}

/// Loadable engine loader that counts loads and can be told to fail them.
pub struct FixedLoader {
    pub loads: AtomicUsize,
    pub engine: Arc<RecordingEngine>,
    fail_load: bool,
}

impl Default for FixedLoader {
    fn default() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            engine: Arc::new(RecordingEngine::default()),
            fail_load: false,
        }
    }
}

impl FixedLoader {
    /// Reports the engine as present but fails every load.
    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }
}

impl EngineLoader for FixedLoader {
    fn is_loadable(&self) -> bool {
        true
    }

    fn load(&self) -> Result<Arc<dyn CodecEngine>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err("corrupt engine module".into());
        }
        Ok(self.engine.clone())
    }
}

#[test]
fn data_url_has_base64_prefix() {
    assert_eq!(data_url(&[0, 0, 0], "image/png"), "data:image/png;base64,AAAA");
}

