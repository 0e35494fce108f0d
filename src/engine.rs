//! The delegated codec engine.
//!
//! The `wasm` strategy does not encode images itself. It hands a file-like
//! object plus a small option set to a [`CodecEngine`] obtained from an
//! [`EngineLoader`], and wraps whatever comes back. The loader is injected,
//! so hosts can plug in their own engine; the crate bundles one
//! ([`Engine`], behind the `engine` feature) that shrinks output until it fits
//! a byte budget.
//!
//! ## Bundled engine algorithm
//!
//! 1. Decode the file.
//! 2. Fit the longest edge into `max_width_or_height` (Lanczos3).
//! 3. Encode at `initial_quality` as `file_type`, falling back to the input
//!    type, falling back to JPEG.
//! 4. While the result exceeds `max_size_mb`: walk a descending quality
//!    ladder (in parallel when `use_parallelism` is set) and keep the highest
//!    quality that fits; if none fits, shrink dimensions by 10% per round.

use crate::types::OutputFormat;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("cannot decode {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("cannot encode {mime_type}: {reason}")]
    Encode { mime_type: String, reason: String },
    #[error("unsupported output type {0}")]
    UnsupportedType(String),
}

/// A named, typed blob: the engine's input and output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Options the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Output budget in megabytes.
    pub max_size_mb: f64,
    /// Bound for the longer edge.
    pub max_width_or_height: Option<u32>,
    pub initial_quality: f32,
    /// Output MIME type; `None` keeps the input type.
    pub file_type: Option<String>,
    pub use_parallelism: bool,
}

pub trait CodecEngine: Send + Sync {
    fn compress(
        &self,
        file: EngineFile,
        options: &EngineOptions,
    ) -> Result<EngineFile, EngineError>;
}

/// Locates and loads a [`CodecEngine`].
pub trait EngineLoader: Send + Sync {
    /// Cheap availability check. Must not load anything.
    fn is_loadable(&self) -> bool;

    /// Load the engine. Called at most once per delegated strategy.
    fn load(&self) -> Result<Arc<dyn CodecEngine>, String>;
}

/// Loader for the engine compiled into this crate.
#[derive(Debug, Default)]
pub struct BundledEngineLoader;

impl EngineLoader for BundledEngineLoader {
    fn is_loadable(&self) -> bool {
        cfg!(feature = "engine")
    }

    #[cfg(feature = "engine")]
    fn load(&self) -> Result<Arc<dyn CodecEngine>, String> {
        log::debug!("loading bundled codec engine");
        Ok(Arc::new(Engine::new()))
    }

    #[cfg(not(feature = "engine"))]
    fn load(&self) -> Result<Arc<dyn CodecEngine>, String> {
        Err("pixpress was built without the `engine` feature".into())
    }
}

/// The loader used when none is injected.
pub fn default_loader() -> Arc<dyn EngineLoader> {
    Arc::new(BundledEngineLoader)
}

#[cfg(feature = "engine")]
pub use bundled::Engine;

#[cfg(feature = "engine")]
mod bundled {
    use super::*;
    use crate::imaging::{compute_target_size, raster};
    use crate::naming::strip_extension;
    use image::DynamicImage;
    use image::imageops::FilterType;
    use rayon::prelude::*;

    /// Rounds of 10% downscaling before giving up on the budget.
    const MAX_SHRINK_ROUNDS: usize = 10;
    const QUALITY_STEP: f32 = 0.1;
    const MIN_QUALITY: f32 = 0.1;

    #[derive(Debug, Default)]
    pub struct Engine;

    impl Engine {
        pub fn new() -> Self {
            Self
        }
    }

    fn output_format(
        file: &EngineFile,
        options: &EngineOptions,
    ) -> Result<OutputFormat, EngineError> {
        match &options.file_type {
            Some(requested) => OutputFormat::from_mime_type(requested)
                .ok_or_else(|| EngineError::UnsupportedType(requested.clone())),
            None => {
                Ok(OutputFormat::from_mime_type(&file.mime_type).unwrap_or(OutputFormat::Jpeg))
            }
        }
    }

    fn fit_longest_edge(img: DynamicImage, bound: Option<u32>) -> DynamicImage {
        let (width, height) = compute_target_size(img.width(), img.height(), bound, bound);
        if (width, height) == (img.width(), img.height()) {
            return img;
        }
        img.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn is_lossy(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Jpeg | OutputFormat::Jpg => true,
            OutputFormat::WebP => raster::LOSSY_WEBP,
            OutputFormat::Png => false,
        }
    }

    /// Qualities strictly below `initial`, highest first.
    pub(super) fn quality_ladder(initial: f32) -> Vec<f32> {
        let steps = ((initial - MIN_QUALITY) / QUALITY_STEP + 1e-3).floor().max(0.0) as usize;
        (1..=steps)
            .map(|i| ((initial - i as f32 * QUALITY_STEP) * 100.0).round() / 100.0)
            .collect()
    }

    struct Encoder {
        format: OutputFormat,
    }

    impl Encoder {
        fn encode(&self, img: &DynamicImage, quality: f32) -> Result<Vec<u8>, EngineError> {
            raster::encode(img, self.format, quality).map_err(|e| EngineError::Encode {
                mime_type: self.format.mime_type().to_string(),
                reason: e.to_string(),
            })
        }

        /// Highest ladder quality whose output fits, if any.
        fn best_fit(
            &self,
            img: &DynamicImage,
            ladder: &[f32],
            budget: usize,
            parallel: bool,
        ) -> Result<Option<(f32, Vec<u8>)>, EngineError> {
            if parallel {
                let attempts: Vec<(f32, Vec<u8>)> = ladder
                    .par_iter()
                    .map(|&q| self.encode(img, q).map(|bytes| (q, bytes)))
                    .collect::<Result<_, _>>()?;
                return Ok(attempts.into_iter().find(|(_, bytes)| bytes.len() <= budget));
            }
            for &q in ladder {
                let bytes = self.encode(img, q)?;
                if bytes.len() <= budget {
                    return Ok(Some((q, bytes)));
                }
            }
            Ok(None)
        }
    }

    impl CodecEngine for Engine {
        fn compress(
            &self,
            file: EngineFile,
            options: &EngineOptions,
        ) -> Result<EngineFile, EngineError> {
            let format = output_format(&file, options)?;
            let img = image::load_from_memory(&file.bytes).map_err(|e| EngineError::Decode {
                name: file.name.clone(),
                reason: e.to_string(),
            })?;
            let mut img = fit_longest_edge(img, options.max_width_or_height);
            let budget = (options.max_size_mb * 1024.0 * 1024.0) as usize;
            let encoder = Encoder { format };

            let mut bytes = encoder.encode(&img, options.initial_quality)?;
            if bytes.len() > budget {
                let ladder = if is_lossy(format) {
                    quality_ladder(options.initial_quality)
                } else {
                    Vec::new()
                };
                let mut quality = options.initial_quality;
                match encoder.best_fit(&img, &ladder, budget, options.use_parallelism)? {
                    Some((q, fitting)) => {
                        log::debug!("{} fits the budget at quality {}", file.name, q);
                        bytes = fitting;
                    }
                    None => {
                        quality = ladder.last().copied().unwrap_or(quality);
                        for _ in 0..MAX_SHRINK_ROUNDS {
                            if bytes.len() <= budget || img.width() <= 1 || img.height() <= 1 {
                                break;
                            }
                            let (width, height) = (
                                ((img.width() as f64) * 0.9).round().max(1.0) as u32,
                                ((img.height() as f64) * 0.9).round().max(1.0) as u32,
                            );
                            img = img.resize_exact(width, height, FilterType::Lanczos3);
                            bytes = encoder.encode(&img, quality)?;
                        }
                        if bytes.len() > budget {
                            log::warn!(
                                "{} is still {} bytes, over the {} byte budget",
                                file.name,
                                bytes.len(),
                                budget
                            );
                        }
                    }
                }
            }

            Ok(EngineFile {
                name: format!("{}.{}", strip_extension(&file.name), format.extension()),
                mime_type: format.mime_type().to_string(),
                bytes,
            })
        }
    }
}

#[cfg(all(test, feature = "engine"))]
mod tests {
    use super::bundled::quality_ladder;
    use super::*;
    use crate::imaging::raster;
    use crate::test_helpers::{noise_image, png_bytes};

    fn options() -> EngineOptions {
        EngineOptions {
            max_size_mb: 10.0,
            max_width_or_height: None,
            initial_quality: 0.8,
            file_type: None,
            use_parallelism: true,
        }
    }

    fn png_file(width: u32, height: u32) -> EngineFile {
        EngineFile {
            name: "image.png".into(),
            mime_type: "image/png".into(),
            bytes: png_bytes(width, height),
        }
    }

    #[test]
    fn keeps_input_type_without_file_type() {
        let out = Engine::new().compress(png_file(10, 10), &options()).unwrap();
        assert_eq!(out.mime_type, "image/png");
        assert_eq!(out.name, "image.png");
        assert!(raster::has_format_tag(&out.bytes, OutputFormat::Png));
    }

    #[test]
    fn converts_to_requested_type() {
        let opts = EngineOptions {
            file_type: Some("image/webp".into()),
            ..options()
        };
        let out = Engine::new().compress(png_file(10, 10), &opts).unwrap();
        assert_eq!(out.name, "image.webp");
        assert!(raster::has_format_tag(&out.bytes, OutputFormat::WebP));
    }

    #[test]
    fn fits_longest_edge() {
        let opts = EngineOptions {
            max_width_or_height: Some(30),
            ..options()
        };
        let out = Engine::new().compress(png_file(120, 60), &opts).unwrap();
        let img = raster::decode(&out.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (30, 15));
    }

    #[test]
    fn rejects_unknown_file_type() {
        let opts = EngineOptions {
            file_type: Some("image/gif".into()),
            ..options()
        };
        let err = Engine::new().compress(png_file(4, 4), &opts).unwrap_err();
        assert_eq!(err, EngineError::UnsupportedType("image/gif".into()));
    }

    #[test]
    fn undecodable_input_names_the_file() {
        let file = EngineFile {
            name: "image.jpg".into(),
            mime_type: "image/jpeg".into(),
            bytes: vec![1, 2, 3],
        };
        let err = Engine::new().compress(file, &options()).unwrap_err();
        assert!(err.to_string().starts_with("cannot decode image.jpg"));
    }

    #[test]
    fn shrinks_jpeg_under_budget() {
        let bytes = raster::encode(&noise_image(256, 256), OutputFormat::Jpeg, 1.0).unwrap();
        let budget = bytes.len() / 4;
        let file = EngineFile {
            name: "noise.jpg".into(),
            mime_type: "image/jpeg".into(),
            bytes,
        };
        for parallel in [true, false] {
            let opts = EngineOptions {
                max_size_mb: budget as f64 / (1024.0 * 1024.0),
                initial_quality: 1.0,
                use_parallelism: parallel,
                ..options()
            };
            let out = Engine::new().compress(file.clone(), &opts).unwrap();
            assert!(
                out.bytes.len() <= budget,
                "parallel={parallel}: {} > {budget}",
                out.bytes.len()
            );
        }
    }

    #[test]
    fn ladder_descends_from_initial_quality() {
        assert_eq!(quality_ladder(0.7), vec![0.6, 0.5, 0.4, 0.3, 0.2, 0.1]);
        assert!(quality_ladder(0.1).is_empty());
        assert!(quality_ladder(0.0).is_empty());
    }

    #[test]
    fn bundled_loader_loads() {
        let loader = BundledEngineLoader;
        assert!(loader.is_loadable());
        assert!(loader.load().is_ok());
    }
}
