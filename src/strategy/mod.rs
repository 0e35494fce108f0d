//! The four interchangeable compression strategies and the selector that
//! picks one per call.
//!
//! | Method | Type | Where the work runs |
//! |---|---|---|
//! | `canvas` | [`MainThreadRaster`] | calling thread, surface scaling |
//! | `worker` | [`BackgroundThread`] | one persistent background thread |
//! | `wasm` | [`DelegatedEngine`] | the delegated codec engine |
//! | `lightweight` | [`DependencyFree`] | calling thread, manual nearest-neighbour |
//!
//! Every strategy implements [`Strategy`], resizes through
//! [`compute_target_size`](crate::imaging::compute_target_size) and names its
//! output through [`derive_filename`](crate::naming::derive_filename).

mod canvas;
mod delegated;
mod lightweight;
mod selector;
mod worker;

pub use crate::engine::{CodecEngine, EngineLoader};
pub use canvas::MainThreadRaster;
pub use delegated::DelegatedEngine;
pub use lightweight::DependencyFree;
pub use selector::{RuntimeSettings, StrategySelector};
pub use worker::BackgroundThread;

use crate::types::{CompressionRequest, CompressionResult, Method};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// What went wrong inside a strategy's pipeline.
///
/// Serializable so the background worker can report the exact failure kind
/// back across its channel.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("delegated engine failed: {0}")]
    DelegatedEngine(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A failed compression, tagged with the strategy that attempted it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{method} compression failed: {cause}")]
pub struct CompressionError {
    pub method: Method,
    #[source]
    pub cause: PipelineError,
}

impl CompressionError {
    pub fn new(method: Method, cause: PipelineError) -> Self {
        Self { method, cause }
    }
}

/// Lock a mutex, recovering the data if another holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Contract shared by every strategy.
///
/// A strategy either returns a complete, non-empty encoded buffer or an
/// error; there is no partial output.
pub trait Strategy: Send + Sync {
    /// The method name reported in results and errors.
    fn method(&self) -> Method;

    /// Decode, optionally downscale and re-encode one image.
    fn compress(&self, request: &CompressionRequest) -> Result<CompressionResult, CompressionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_names_the_method() {
        let err = CompressionError::new(Method::Canvas, PipelineError::Decode("bad header".into()));
        assert_eq!(err.to_string(), "canvas compression failed: decode failed: bad header");
    }

    #[test]
    fn error_exposes_cause_as_source() {
        use std::error::Error as _;
        let cause = PipelineError::Timeout(Duration::from_secs(2));
        let err = CompressionError::new(Method::Worker, cause);
        let source = err.source().expect("cause is the source");
        assert_eq!(source.to_string(), "timed out after 2s");
    }
}
