//! Host capability detection.
//!
//! The [`Environment`] trait is the seam between strategy selection and the
//! host: the production [`HostEnvironment`] actually probes, tests inject a
//! fixed answer.
//!
//! | Capability | Probe |
//! |---|---|
//! | `synchronous_raster` | 1×1 surface, filled, trial-encoded as JPEG |
//! | `background_context` | thread support on the target (no spawn) |
//! | `off_thread_raster` | surfaces are `Send`, so present wherever threads are |
//! | `delegated_engine_loadable` | [`EngineLoader::is_loadable`] (no load) |
//! | `next_gen_format_supported` | lossy WebP built in, 1×1 trial encode tagged `RIFF....WEBP` |
//!
//! Every probe degrades to `false` instead of failing.

use crate::imaging::raster;
use crate::strategy::EngineLoader;
use crate::types::OutputFormat;
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of what the host supports. Never mutated once created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub synchronous_raster: bool,
    pub background_context: bool,
    pub off_thread_raster: bool,
    pub delegated_engine_loadable: bool,
    pub next_gen_format_supported: bool,
}

impl Capabilities {
    /// Everything available.
    pub fn all() -> Self {
        Self {
            synchronous_raster: true,
            background_context: true,
            off_thread_raster: true,
            delegated_engine_loadable: true,
            next_gen_format_supported: true,
        }
    }
}

/// What strategy selection needs to know about the host.
pub trait Environment: Send + Sync {
    /// Probe the host. Infallible: failed probes report `false`.
    fn detect(&self) -> Capabilities;

    /// Whether the host blocks ephemeral scratch objects, a proxy for a
    /// restrictive sandbox that also blocks other dynamic primitives.
    fn has_restrictive_policy(&self) -> bool;
}

/// Probes the real host.
pub struct HostEnvironment {
    engine_loader: Arc<dyn EngineLoader>,
}

impl HostEnvironment {
    pub fn new(engine_loader: Arc<dyn EngineLoader>) -> Self {
        Self { engine_loader }
    }
}

fn threads_supported() -> bool {
    !cfg!(target_family = "wasm") && std::thread::available_parallelism().is_ok()
}

fn surfaces_are_send() -> bool {
    fn is_send<T: Send>() -> bool {
        true
    }
    is_send::<RgbaImage>()
}

impl Environment for HostEnvironment {
    fn detect(&self) -> Capabilities {
        let background_context = threads_supported();
        let capabilities = Capabilities {
            synchronous_raster: raster::trial_encode(OutputFormat::Jpeg),
            background_context,
            off_thread_raster: background_context && surfaces_are_send(),
            delegated_engine_loadable: self.engine_loader.is_loadable(),
            next_gen_format_supported: raster::LOSSY_WEBP
                && raster::trial_encode(OutputFormat::WebP),
        };
        log::debug!("detected capabilities: {:?}", capabilities);
        capabilities
    }

    fn has_restrictive_policy(&self) -> bool {
        match tempfile::tempfile() {
            Ok(_scratch) => false,
            Err(e) => {
                log::info!(
                    "ephemeral scratch objects are blocked ({}); assuming a restrictive policy",
                    e
                );
                true
            }
        }
    }
}
