//! Picking a strategy for a call.
//!
//! A preferred method is honoured when the host can run it; otherwise the
//! automatic order applies:
//!
//! 1. `canvas` when synchronous raster works and the host policy is not restrictive
//! 2. `worker` when a background context exists
//! 3. `wasm` when the delegated engine can be constructed
//! 4. `lightweight`
//!
//! Strategy instances are created lazily and kept for the selector's
//! lifetime, so the background worker survives across calls.

use super::{
    BackgroundThread, DelegatedEngine, DependencyFree, EngineLoader, MainThreadRaster, Strategy,
    lock,
};
use crate::capabilities::{Capabilities, Environment};
use crate::types::{CompressionOptions, Method};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Timeouts and budgets handed to the strategies that need them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSettings {
    /// Bound on the worker's readiness handshake and on each job.
    pub worker_timeout: Duration,
    /// Bound on each delegated engine call.
    pub engine_timeout: Duration,
    /// Output budget passed to the delegated engine.
    pub max_size_mb: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(30),
            engine_timeout: Duration::from_secs(60),
            max_size_mb: 10.0,
        }
    }
}

pub struct StrategySelector {
    environment: Arc<dyn Environment>,
    loader: Arc<dyn EngineLoader>,
    settings: RuntimeSettings,
    canvas: OnceLock<Arc<MainThreadRaster>>,
    worker: OnceLock<Arc<BackgroundThread>>,
    delegated: Mutex<Option<Arc<DelegatedEngine>>>,
    lightweight: OnceLock<Arc<DependencyFree>>,
}

impl StrategySelector {
    pub fn new(
        environment: Arc<dyn Environment>,
        loader: Arc<dyn EngineLoader>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            environment,
            loader,
            settings,
            canvas: OnceLock::new(),
            worker: OnceLock::new(),
            delegated: Mutex::new(None),
            lightweight: OnceLock::new(),
        }
    }

    pub fn select(
        &self,
        capabilities: &Capabilities,
        options: &CompressionOptions,
    ) -> Arc<dyn Strategy> {
        if let Some(method) = options.preferred_method {
            if let Some(strategy) = self.preferred(method, capabilities) {
                log::info!("using preferred method {}", method);
                return strategy;
            }
            log::warn!("preferred method {} is unavailable, selecting automatically", method);
        }
        let strategy = self.automatic(capabilities);
        log::info!("selected {} compression", strategy.method());
        strategy
    }

    fn preferred(&self, method: Method, capabilities: &Capabilities) -> Option<Arc<dyn Strategy>> {
        match method {
            Method::Canvas if capabilities.synchronous_raster => Some(self.canvas()),
            Method::Worker if capabilities.background_context => Some(self.worker()),
            Method::Wasm => self.delegated(),
            Method::Lightweight => Some(self.lightweight()),
            _ => None,
        }
    }

    fn automatic(&self, capabilities: &Capabilities) -> Arc<dyn Strategy> {
        if capabilities.synchronous_raster && !self.environment.has_restrictive_policy() {
            return self.canvas();
        }
        if capabilities.background_context {
            return self.worker();
        }
        match self.delegated() {
            Some(strategy) => strategy,
            None => {
                log::warn!("codec engine unavailable, falling back to lightweight compression");
                self.lightweight()
            }
        }
    }

    fn canvas(&self) -> Arc<dyn Strategy> {
        self.canvas
            .get_or_init(|| Arc::new(MainThreadRaster::new()))
            .clone()
    }

    fn worker(&self) -> Arc<dyn Strategy> {
        self.worker
            .get_or_init(|| Arc::new(BackgroundThread::new(self.settings.worker_timeout)))
            .clone()
    }

    fn lightweight(&self) -> Arc<dyn Strategy> {
        self.lightweight
            .get_or_init(|| Arc::new(DependencyFree::new()))
            .clone()
    }

    /// The delegated strategy, constructed on demand. A failed construction
    /// is not remembered; the availability check is cheap and runs again on
    /// the next selection.
    fn delegated(&self) -> Option<Arc<dyn Strategy>> {
        let mut slot = lock(&self.delegated);
        if slot.is_none() {
            match DelegatedEngine::new(
                Arc::clone(&self.loader),
                self.settings.engine_timeout,
                self.settings.max_size_mb,
            ) {
                Ok(strategy) => *slot = Some(Arc::new(strategy)),
                Err(e) => log::info!("{}", e),
            }
        }
        slot.as_ref().map(|strategy| -> Arc<dyn Strategy> { strategy.clone() })
    }

    /// Stop the background worker, if one was started.
    pub fn destroy(&self) {
        if let Some(worker) = self.worker.get() {
            worker.destroy();
        }
    }
}
