//! `wasm`: hand the image to the delegated codec engine.
//!
//! Construction only checks that the engine can be found; the engine itself
//! loads on the first `compress` and exactly once. A failed load is
//! remembered and every later call fails the same way.

use super::{CompressionError, PipelineError, Strategy};
use crate::engine::{CodecEngine, EngineFile, EngineLoader, EngineOptions};
use crate::imaging::{raster, source};
use crate::naming::derive_filename;
use crate::types::{
    CompressionOptions, CompressionRequest, CompressionResult, ImageSource, Method, OutputFormat,
};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

const FALLBACK_MIME: &str = "image/jpeg";

pub struct DelegatedEngine {
    loader: Arc<dyn EngineLoader>,
    engine: OnceLock<Result<Arc<dyn CodecEngine>, String>>,
    timeout: Duration,
    max_size_mb: f64,
}

impl DelegatedEngine {
    /// Fails with an initialization error when the loader cannot find the
    /// engine.
    pub fn new(
        loader: Arc<dyn EngineLoader>,
        timeout: Duration,
        max_size_mb: f64,
    ) -> Result<Self, CompressionError> {
        if !loader.is_loadable() {
            return Err(CompressionError::new(
                Method::Wasm,
                PipelineError::Initialization("codec engine is not available".into()),
            ));
        }
        Ok(Self {
            loader,
            engine: OnceLock::new(),
            timeout,
            max_size_mb,
        })
    }

    fn engine(&self) -> Result<Arc<dyn CodecEngine>, PipelineError> {
        self.engine
            .get_or_init(|| {
                let loaded = self.loader.load();
                if let Err(e) = &loaded {
                    log::warn!("codec engine failed to load: {}", e);
                }
                loaded
            })
            .clone()
            .map_err(|e| {
                PipelineError::Initialization(format!("codec engine failed to load: {}", e))
            })
    }

    /// Translate validated options into the engine's option set.
    pub fn engine_options(&self, options: &CompressionOptions) -> EngineOptions {
        let max_width_or_height = match (options.max_width, options.max_height) {
            (Some(w), Some(h)) => Some(w.max(h)),
            (w, h) => w.or(h),
        };
        EngineOptions {
            max_size_mb: self.max_size_mb,
            max_width_or_height,
            initial_quality: options.quality,
            file_type: (options.format != OutputFormat::Jpg)
                .then(|| options.format.mime_type().to_string()),
            use_parallelism: true,
        }
    }

    fn run(&self, request: &CompressionRequest) -> Result<CompressionResult, PipelineError> {
        let engine = self.engine()?;
        let file = engine_file(&request.source)?;
        let options = self.engine_options(&request.options);

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("pixpress-engine".into())
            .spawn(move || {
                let _ = tx.send(engine.compress(file, &options));
            })
            .map_err(|e| {
                PipelineError::Initialization(format!("failed to start engine call: {}", e))
            })?;

        let output = match rx.recv_timeout(self.timeout) {
            Ok(outcome) => outcome.map_err(|e| PipelineError::DelegatedEngine(e.to_string()))?,
            Err(RecvTimeoutError::Timeout) => return Err(PipelineError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PipelineError::DelegatedEngine("engine call panicked".into()));
            }
        };
        if output.bytes.is_empty() {
            return Err(PipelineError::DelegatedEngine("engine returned an empty file".into()));
        }
        Ok(CompressionResult::new(
            output.bytes,
            derive_filename(&request.source, request.options.format),
        ))
    }
}

/// Turn a source into the file-like object the engine accepts.
fn engine_file(source: &ImageSource) -> Result<EngineFile, PipelineError> {
    match source {
        ImageSource::File {
            name,
            bytes,
            mime_type,
        } => Ok(EngineFile {
            name: name.clone(),
            mime_type: mime_type
                .clone()
                .or_else(|| raster::sniff_mime_type(bytes))
                .unwrap_or_else(|| FALLBACK_MIME.to_string()),
            bytes: bytes.clone(),
        }),
        ImageSource::Decoded(img) => Ok(EngineFile {
            name: "image.png".into(),
            mime_type: OutputFormat::Png.mime_type().into(),
            bytes: raster::encode(img, OutputFormat::Png, 1.0)?,
        }),
        ImageSource::Bytes { .. } | ImageSource::Reference(_) => {
            let materialized = source::materialize(source)?.ok_or_else(|| {
                PipelineError::UnsupportedInput("source has no encoded bytes".into())
            })?;
            Ok(EngineFile {
                name: "image.jpg".into(),
                mime_type: materialized
                    .mime_type
                    .unwrap_or_else(|| FALLBACK_MIME.to_string()),
                bytes: materialized.bytes,
            })
        }
    }
}

impl Strategy for DelegatedEngine {
    fn method(&self) -> Method {
        Method::Wasm
    }

    fn compress(
        &self,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, CompressionError> {
        self.run(request)
            .map_err(|cause| CompressionError::new(self.method(), cause))
    }
}
