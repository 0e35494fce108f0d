//! The public compression API.
//!
//! A [`Compressor`] binds default options to a host environment and a
//! strategy selector. Each call merges the defaults with the call's own
//! overrides (call-site values win), validates them, picks a strategy and
//! runs it. [`compress`] and [`compress_multiple`] are one-shot wrappers that
//! build a throwaway compressor.
//!
//! ## Batches
//!
//! Batch items run one after another through the same single-image path.
//! A failing item is recorded in its slot and never stops its siblings, so
//! the result always has one entry per input, in input order.

use crate::capabilities::{Capabilities, Environment, HostEnvironment};
use crate::config::{CompressorConfig, OptionsOverride};
use crate::engine::{EngineLoader, default_loader};
use crate::imaging::source;
use crate::strategy::{CompressionError, RuntimeSettings, StrategySelector};
use crate::types::{
    Compressed, CompressionRequest, CompressionStats, ImageSource, Method, OutputFormat,
};
use serde::Serialize;
use std::sync::mpsc::Sender;
use std::sync::{Arc, OnceLock};

/// Progress of a batch, streamed while it runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        index: usize,
        total: usize,
        label: String,
    },
    Finished {
        index: usize,
        method: Method,
        filename: String,
        stats: CompressionStats,
    },
    Failed {
        index: usize,
        message: String,
    },
}

/// Outcome of one batch slot.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Compressed(Compressed),
    Failed { index: usize, message: String },
}

impl BatchItem {
    pub fn compressed(&self) -> Option<&Compressed> {
        match self {
            Self::Compressed(c) => Some(c),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Totals over the successful items of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub total_original: u64,
    pub total_compressed: u64,
    pub total_saved: i64,
    /// Percentage of the original bytes saved, rounded like the per-image
    /// `compression_ratio`.
    pub overall_ratio: i64,
}

/// One slot per input, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|item| item.is_failed())
    }

    pub fn successes(&self) -> impl Iterator<Item = &Compressed> {
        self.items.iter().filter_map(BatchItem::compressed)
    }

    /// Aggregate statistics over successes; `None` when nothing succeeded.
    pub fn summary(&self) -> Option<BatchSummary> {
        let mut summary = BatchSummary {
            processed: 0,
            total_original: 0,
            total_compressed: 0,
            total_saved: 0,
            overall_ratio: 0,
        };
        for item in self.successes() {
            summary.processed += 1;
            summary.total_original += item.stats.original_size;
            summary.total_compressed += item.stats.compressed_size;
            summary.total_saved += item.stats.saved_bytes;
        }
        if summary.processed == 0 {
            return None;
        }
        if summary.total_original > 0 {
            let ratio = summary.total_saved as f64 / summary.total_original as f64 * 100.0;
            summary.overall_ratio = ratio.round() as i64;
        }
        Some(summary)
    }
}

/// Rough output size for a quality and format, without encoding anything.
pub fn estimate_compressed_size(original_size: u64, quality: f64, format: OutputFormat) -> u64 {
    let base_ratio = match format {
        OutputFormat::WebP => 0.25,
        OutputFormat::Jpeg | OutputFormat::Jpg => 0.35,
        OutputFormat::Png => 0.8,
    };
    let quality_multiplier = 0.3 + quality * 0.7;
    (original_size as f64 * base_ratio * quality_multiplier).round() as u64
}

pub struct Compressor {
    defaults: OptionsOverride,
    environment: Arc<dyn Environment>,
    selector: StrategySelector,
    capabilities: OnceLock<Capabilities>,
}

impl Compressor {
    /// Compressor for the real host with the bundled engine.
    pub fn new(defaults: OptionsOverride) -> Self {
        Self::with_settings(defaults, RuntimeSettings::default())
    }

    /// Compressor whose defaults and timeouts come from a loaded config.
    pub fn from_config(config: &CompressorConfig) -> Self {
        Self::with_settings(config.options.clone(), config.runtime_settings())
    }

    fn with_settings(defaults: OptionsOverride, settings: RuntimeSettings) -> Self {
        let loader = default_loader();
        let environment = Arc::new(HostEnvironment::new(Arc::clone(&loader)));
        Self::with_environment(defaults, environment, loader, settings)
    }

    /// Compressor with an injected environment and engine loader.
    pub fn with_environment(
        defaults: OptionsOverride,
        environment: Arc<dyn Environment>,
        loader: Arc<dyn EngineLoader>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            defaults,
            selector: StrategySelector::new(Arc::clone(&environment), loader, settings),
            environment,
            capabilities: OnceLock::new(),
        }
    }

    /// Host capabilities, probed once per compressor.
    pub fn capabilities(&self) -> Capabilities {
        *self.capabilities.get_or_init(|| self.environment.detect())
    }

    /// The method a call with `overrides` would use, without running it.
    pub fn selected_method(&self, overrides: &OptionsOverride) -> Method {
        let options = self.defaults.merge(overrides).validate();
        self.selector.select(&self.capabilities(), &options).method()
    }

    pub fn compress(
        &self,
        input: ImageSource,
        overrides: &OptionsOverride,
    ) -> Result<Compressed, CompressionError> {
        let options = self.defaults.merge(overrides).validate();
        let strategy = self.selector.select(&self.capabilities(), &options);
        let original_size = source::original_size(&input);
        let request = CompressionRequest {
            source: input,
            options,
        };

        let result = strategy.compress(&request)?;
        let stats = CompressionStats::new(original_size, result.byte_size as u64, options.format);
        Ok(Compressed {
            result,
            stats,
            method: strategy.method(),
        })
    }

    pub fn compress_multiple(
        &self,
        inputs: Vec<ImageSource>,
        overrides: &OptionsOverride,
    ) -> BatchResult {
        self.compress_multiple_with_events(inputs, overrides, None)
    }

    /// Like [`compress_multiple`](Self::compress_multiple), reporting
    /// progress on `events` as items start and finish.
    pub fn compress_multiple_with_events(
        &self,
        inputs: Vec<ImageSource>,
        overrides: &OptionsOverride,
        events: Option<&Sender<BatchEvent>>,
    ) -> BatchResult {
        let emit = |event: BatchEvent| {
            if let Some(tx) = events {
                tx.send(event).ok();
            }
        };

        let total = inputs.len();
        let mut items = Vec::with_capacity(total);
        for (index, input) in inputs.into_iter().enumerate() {
            emit(BatchEvent::Started {
                index,
                total,
                label: input.label(),
            });
            match self.compress(input, overrides) {
                Ok(compressed) => {
                    log::info!(
                        "[{}/{}] {} via {}",
                        index + 1,
                        total,
                        compressed.result.filename,
                        compressed.method
                    );
                    emit(BatchEvent::Finished {
                        index,
                        method: compressed.method,
                        filename: compressed.result.filename.clone(),
                        stats: compressed.stats.clone(),
                    });
                    items.push(BatchItem::Compressed(compressed));
                }
                Err(e) => {
                    let message = e.to_string();
                    log::warn!("[{}/{}] failed: {}", index + 1, total, message);
                    emit(BatchEvent::Failed {
                        index,
                        message: message.clone(),
                    });
                    items.push(BatchItem::Failed { index, message });
                }
            }
        }
        BatchResult { items }
    }

    /// Stop the background worker, if one was started.
    pub fn destroy(&self) {
        self.selector.destroy();
    }
}

/// Compress one image with default settings.
pub fn compress(
    input: ImageSource,
    options: &OptionsOverride,
) -> Result<Compressed, CompressionError> {
    let compressor = Compressor::new(OptionsOverride::default());
    let result = compressor.compress(input, options);
    compressor.destroy();
    result
}

/// Compress several images with default settings.
pub fn compress_multiple(inputs: Vec<ImageSource>, options: &OptionsOverride) -> BatchResult {
    let compressor = Compressor::new(OptionsOverride::default());
    let result = compressor.compress_multiple(inputs, options);
    compressor.destroy();
    result
}
