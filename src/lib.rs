//! # pixpress
//!
//! Turn an image into a smaller encoded buffer under a quality, size and
//! format budget, choosing how to do the work from what the host allows.
//!
//! ```no_run
//! use pixpress::{ImageSource, OptionsOverride};
//!
//! let bytes = std::fs::read("holiday.jpg")?;
//! let options = OptionsOverride {
//!     quality: Some(0.8),
//!     format: Some("webp".into()),
//!     max_width: Some(1920),
//!     ..OptionsOverride::default()
//! };
//! let out = pixpress::compress(ImageSource::file("holiday.jpg", bytes), &options)?;
//! println!("{} is {} bytes, via {}", out.result.filename, out.result.byte_size, out.method);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! Environment::detect ─▶ StrategySelector::select ─▶ Strategy::compress ─▶ CompressionResult
//!                                                      └─ compute_target_size
//! ```
//!
//! Every call merges the compressor's default options with the call's own,
//! validates them, probes the host (once per compressor), picks a strategy
//! and runs it. Batches repeat this per item and never let one failure abort
//! the rest.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`compressor`] | Public API: [`Compressor`], [`compress`], [`compress_multiple`], batch results |
//! | [`strategy`] | The four strategies, their shared trait, and the selector |
//! | [`capabilities`] | Host capability probing behind the [`Environment`](capabilities::Environment) trait |
//! | [`engine`] | The delegated codec engine seam and the bundled engine |
//! | [`imaging`] | Target-size math, raster surface, nearest-neighbour resampling, source resolution |
//! | [`config`] | Option overrides and validation, `pixpress.toml` loading |
//! | [`types`] | Sources, options, results and statistics |
//! | [`naming`] | Output filename derivation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Strategies Are Interchangeable
//!
//! All four strategies accept the same request and return the same result;
//! they differ only in where the work runs and how pixels are scaled. The
//! selector hands out `Arc<dyn Strategy>` and owns the instances, so the
//! background worker survives across calls until [`Compressor::destroy`].
//!
//! ## Bounded Waits
//!
//! Every wait on another thread (worker startup, worker jobs, engine calls)
//! has a configurable timeout. A timed-out job is forgotten; if its answer
//! arrives later it is dropped.
//!
//! ## Injected Host
//!
//! Capability probing and engine loading are traits, so selection can be
//! tested against any combination of host capabilities without touching the
//! real machine.

pub mod capabilities;
pub mod compressor;
pub mod config;
pub mod engine;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod strategy;
pub mod types;

pub use compressor::{
    BatchEvent, BatchItem, BatchResult, BatchSummary, Compressor, compress, compress_multiple,
    estimate_compressed_size,
};
pub use config::OptionsOverride;
pub use strategy::{CompressionError, PipelineError};
pub use types::{
    Compressed, CompressionOptions, CompressionResult, CompressionStats, ImageSource, Method,
    OutputFormat,
};

#[cfg(test)]
pub(crate) mod test_helpers;
