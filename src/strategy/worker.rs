//! `worker`: the pipeline on one persistent background thread.
//!
//! ## Threads and channels
//!
//! ```text
//!  caller ──WorkerRequest──▶ worker thread ──WorkerResponse──▶ dispatcher thread
//!    ▲                                                              │
//!    └────────── per-request reply channel (pending table) ◀────────┘
//! ```
//!
//! The worker announces itself with a single `ready` message before it takes
//! any work. Every job carries a random correlation id; the dispatcher looks
//! the id up in the pending table and forwards the outcome to whoever is
//! waiting. Responses for ids nobody waits on (late replies after a timeout)
//! are dropped.
//!
//! A job that panics is answered with a surface error and the worker keeps
//! serving. If the thread dies anyway, the next call retires it and starts a
//! fresh one.
//!
//! Message shapes (as JSON):
//!
//! ```text
//! {"type":"ready"}
//! {"type":"compress","id":"…","payload":{"kind":"raw-bytes","bytes":[…],…},"options":{…}}
//! {"type":"success","id":"…","encodedBuffer":[…]}
//! {"type":"error","id":"…","message":"…","cause":{"kind":"decode","detail":"…"}}
//! ```

use super::{CompressionError, PipelineError, Strategy, lock};
use crate::imaging::{compute_target_size, raster, source};
use crate::naming::derive_filename;
use crate::types::{
    CompressionOptions, CompressionRequest, CompressionResult, ImageSource, Method,
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Image data as it crosses to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkerPayload {
    RawBytes {
        bytes: Vec<u8>,
        #[serde(rename = "mimeType")]
        mime_type: Option<String>,
    },
    StringRef {
        value: String,
    },
    PixelBuffer {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
}

impl WorkerPayload {
    /// Marshal a source on the calling thread. Decoded handles are read back
    /// into raw RGBA pixels here, since only plain data crosses to the worker.
    pub fn from_source(source: &ImageSource) -> Self {
        match source {
            ImageSource::File {
                bytes, mime_type, ..
            }
            | ImageSource::Bytes { bytes, mime_type } => Self::RawBytes {
                bytes: bytes.clone(),
                mime_type: mime_type.clone(),
            },
            ImageSource::Reference(value) => Self::StringRef {
                value: value.clone(),
            },
            ImageSource::Decoded(img) => {
                let (bytes, width, height) = raster::read_pixels(img);
                Self::PixelBuffer {
                    bytes,
                    width,
                    height,
                }
            }
        }
    }

    fn decode(self) -> Result<DynamicImage, PipelineError> {
        match self {
            Self::RawBytes { bytes, .. } => raster::decode(&bytes),
            Self::StringRef { value } => {
                raster::decode(&source::resolve_reference(&value)?.bytes)
            }
            Self::PixelBuffer {
                bytes,
                width,
                height,
            } => raster::from_pixels(bytes, width, height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Compress {
        id: String,
        payload: WorkerPayload,
        options: CompressionOptions,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    Ready,
    Success {
        id: String,
        #[serde(rename = "encodedBuffer")]
        encoded_buffer: Vec<u8>,
    },
    Error {
        id: String,
        message: String,
        cause: PipelineError,
    },
}

type Reply = Result<Vec<u8>, PipelineError>;
type PendingTable = Arc<Mutex<HashMap<String, Sender<Reply>>>>;
type Job = fn(WorkerPayload, &CompressionOptions) -> Reply;

/// Worker thread body: announce readiness, then serve jobs until the request
/// channel closes.
fn worker_loop(requests: Receiver<WorkerRequest>, responses: Sender<WorkerResponse>, job: Job) {
    if responses.send(WorkerResponse::Ready).is_err() {
        return;
    }
    for request in requests {
        let WorkerRequest::Compress {
            id,
            payload,
            options,
        } = request;
        let response = match run_job(job, payload, &options) {
            Ok(encoded_buffer) => WorkerResponse::Success { id, encoded_buffer },
            Err(cause) => WorkerResponse::Error {
                id,
                message: cause.to_string(),
                cause,
            },
        };
        if responses.send(response).is_err() {
            break;
        }
    }
    log::debug!("worker request channel closed, exiting");
}

/// Run one job, turning a panic into a surface error.
fn run_job(job: Job, payload: WorkerPayload, options: &CompressionOptions) -> Reply {
    panic::catch_unwind(AssertUnwindSafe(|| job(payload, options))).unwrap_or_else(|panic| {
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("worker job panicked: {}", detail);
        Err(PipelineError::Surface(format!("job panicked: {}", detail)))
    })
}

fn process(payload: WorkerPayload, options: &CompressionOptions) -> Reply {
    let img = payload.decode()?;
    let (width, height) =
        compute_target_size(img.width(), img.height(), options.max_width, options.max_height);
    let surface = raster::draw_scaled(img, width, height);
    raster::encode(&surface, options.format, options.quality)
}

/// Dispatcher thread body: route every response to its waiter.
///
/// When the worker goes away the pending table is cleared, which wakes every
/// remaining waiter with a disconnect.
fn dispatch_loop(
    responses: Receiver<WorkerResponse>,
    pending: PendingTable,
    ready: Sender<()>,
) {
    for response in responses {
        match response {
            WorkerResponse::Ready => {
                let _ = ready.send(());
            }
            WorkerResponse::Success { id, encoded_buffer } => {
                route(&pending, &id, Ok(encoded_buffer))
            }
            WorkerResponse::Error { id, cause, .. } => route(&pending, &id, Err(cause)),
        }
    }
    lock(&pending).clear();
}

fn route(pending: &PendingTable, id: &str, reply: Reply) {
    match lock(pending).remove(id) {
        Some(waiter) => {
            if waiter.send(reply).is_err() {
                log::debug!("waiter for worker response {} is gone", id);
            }
        }
        None => log::debug!("ignoring worker response with unknown id {}", id),
    }
}

/// Wait for the reply registered under `id`, giving up after `timeout`.
///
/// `None` means the worker went away before answering.
fn await_reply(
    pending: &PendingTable,
    id: &str,
    reply: Receiver<Reply>,
    timeout: Duration,
) -> Option<Reply> {
    match reply.recv_timeout(timeout) {
        Ok(outcome) => Some(outcome),
        Err(RecvTimeoutError::Timeout) => {
            lock(pending).remove(id);
            log::warn!("worker job {} timed out after {:?}", id, timeout);
            Some(Err(PipelineError::Timeout(timeout)))
        }
        Err(RecvTimeoutError::Disconnected) => None,
    }
}

struct WorkerHandle {
    requests: Sender<WorkerRequest>,
    pending: PendingTable,
    worker: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl WorkerHandle {
    fn spawn(ready_timeout: Duration, job: Job) -> Result<Self, PipelineError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let pending: PendingTable = Arc::default();

        let spawn_error = |e: std::io::Error| {
            PipelineError::Initialization(format!("failed to spawn worker: {}", e))
        };
        let worker = thread::Builder::new()
            .name("pixpress-worker".into())
            .spawn(move || worker_loop(request_rx, response_tx, job))
            .map_err(spawn_error)?;
        let dispatcher = {
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("pixpress-dispatch".into())
                .spawn(move || dispatch_loop(response_rx, pending, ready_tx))
                .map_err(spawn_error)?
        };

        let handle = Self {
            requests: request_tx,
            pending,
            worker,
            dispatcher,
        };
        let failure = match ready_rx.recv_timeout(ready_timeout) {
            Ok(()) => {
                log::debug!("background worker ready");
                return Ok(handle);
            }
            Err(RecvTimeoutError::Timeout) => PipelineError::Timeout(ready_timeout),
            Err(RecvTimeoutError::Disconnected) => PipelineError::Initialization(
                "worker exited before announcing readiness".into(),
            ),
        };
        handle.shutdown();
        Err(failure)
    }

    fn shutdown(self) {
        drop(self.requests);
        if self.worker.join().is_err() {
            log::warn!("background worker panicked");
        }
        if self.dispatcher.join().is_err() {
            log::warn!("worker dispatcher panicked");
        }
    }
}

/// Runs every job on a single long-lived thread, created on first use.
///
/// `compress` takes `&self` and may be called from several threads at once;
/// replies are matched by correlation id, so completion order does not
/// matter. Call [`destroy`](Self::destroy) to stop the thread.
pub struct BackgroundThread {
    timeout: Duration,
    job: Job,
    handle: Mutex<Option<WorkerHandle>>,
}

impl BackgroundThread {
    /// `timeout` bounds both the readiness handshake and each job.
    pub fn new(timeout: Duration) -> Self {
        Self::with_job(timeout, process)
    }

    fn with_job(timeout: Duration, job: Job) -> Self {
        Self {
            timeout,
            job,
            handle: Mutex::new(None),
        }
    }

    /// Whether the worker thread has been started and not destroyed.
    pub fn is_running(&self) -> bool {
        lock(&self.handle).is_some()
    }

    /// Stop the worker and wait for both threads to exit. A later
    /// `compress` starts a fresh worker.
    pub fn destroy(&self) {
        if let Some(handle) = lock(&self.handle).take() {
            handle.shutdown();
            log::debug!("background worker stopped");
        }
    }

    fn channels(&self) -> Result<(Sender<WorkerRequest>, PendingTable), PipelineError> {
        let mut slot = lock(&self.handle);
        if let Some(dead) = slot.take_if(|h| h.worker.is_finished()) {
            log::warn!("background worker exited unexpectedly, restarting");
            dead.shutdown();
        }
        if slot.is_none() {
            *slot = Some(WorkerHandle::spawn(self.timeout, self.job)?);
        }
        match slot.as_ref() {
            Some(handle) => Ok((handle.requests.clone(), Arc::clone(&handle.pending))),
            None => Err(PipelineError::Initialization("worker unavailable".into())),
        }
    }

    /// Drop the worker that owns `pending` if it is still the current one.
    fn retire(&self, pending: &PendingTable) {
        let dead = lock(&self.handle).take_if(|h| Arc::ptr_eq(&h.pending, pending));
        if let Some(handle) = dead {
            log::warn!("background worker exited unexpectedly, restarting on next use");
            handle.shutdown();
        }
    }

    /// Register `id` and hand the job to a live worker. A worker found dead
    /// at send time is replaced once, since the job never reached it.
    fn submit(
        &self,
        id: &str,
        payload: WorkerPayload,
        options: CompressionOptions,
    ) -> Result<(PendingTable, Receiver<Reply>), PipelineError> {
        let mut message = WorkerRequest::Compress {
            id: id.to_string(),
            payload,
            options,
        };
        for _ in 0..2 {
            let (requests, pending) = self.channels()?;
            let (reply_tx, reply_rx) = mpsc::channel();
            lock(&pending).insert(id.to_string(), reply_tx);
            match requests.send(message) {
                Ok(()) => return Ok((pending, reply_rx)),
                Err(mpsc::SendError(returned)) => {
                    lock(&pending).remove(id);
                    self.retire(&pending);
                    message = returned;
                }
            }
        }
        Err(PipelineError::Initialization("worker has exited".into()))
    }

    fn run(&self, request: &CompressionRequest) -> Result<CompressionResult, PipelineError> {
        let id = Uuid::new_v4().to_string();
        let payload = WorkerPayload::from_source(&request.source);
        let (pending, reply_rx) = self.submit(&id, payload, request.options)?;

        let encoded = match await_reply(&pending, &id, reply_rx, self.timeout) {
            Some(outcome) => outcome?,
            None => {
                self.retire(&pending);
                return Err(PipelineError::Surface(
                    "worker exited before responding".into(),
                ));
            }
        };
        if encoded.is_empty() {
            return Err(PipelineError::Surface("worker returned an empty buffer".into()));
        }
        Ok(CompressionResult::new(
            encoded,
            derive_filename(&request.source, request.options.format),
        ))
    }
}

impl Strategy for BackgroundThread {
    fn method(&self) -> Method {
        Method::Worker
    }

    fn compress(
        &self,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, CompressionError> {
        self.run(request)
            .map_err(|cause| CompressionError::new(self.method(), cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{data_url, gradient_image, png_bytes, request};
    use crate::types::OutputFormat;
    use serde_json::json;

    fn worker() -> BackgroundThread {
        BackgroundThread::new(Duration::from_secs(30))
    }

    #[test]
    fn worker_is_lazy_and_persistent() {
        let w = worker();
        assert!(!w.is_running());

        let req = request(
            ImageSource::bytes(png_bytes(20, 10)),
            OutputFormat::Png,
            Some(10),
            None,
        );
        w.compress(&req).unwrap();
        assert!(w.is_running());
        w.compress(&req).unwrap();
        assert!(w.is_running());

        w.destroy();
        assert!(!w.is_running());
    }

    #[test]
    fn compresses_every_source_shape() {
        let w = worker();
        let png = png_bytes(40, 20);
        let shapes = [
            ImageSource::file("cat.png", png.clone()),
            ImageSource::bytes(png.clone()),
            ImageSource::Reference(data_url(&png, "image/png")),
            ImageSource::Decoded(gradient_image(40, 20)),
        ];
        for source in shapes {
            let req = request(source, OutputFormat::Png, Some(20), None);
            let out = w.compress(&req).unwrap();
            let img = raster::decode(&out.encoded).unwrap();
            assert_eq!((img.width(), img.height()), (20, 10));
        }
        w.destroy();
    }

    #[test]
    fn worker_errors_keep_their_kind() {
        let w = worker();
        let junk = ImageSource::bytes(b"junk".to_vec());
        let req = request(junk, OutputFormat::Jpeg, None, None);
        let err = w.compress(&req).unwrap_err();
        assert_eq!(err.method, Method::Worker);
        assert!(matches!(err.cause, PipelineError::Decode(_)));

        // A failed job leaves the worker usable.
        let ok = request(ImageSource::bytes(png_bytes(4, 4)), OutputFormat::Jpeg, None, None);
        assert!(w.compress(&ok).is_ok());
        w.destroy();
    }

    /// Panics on an empty raw buffer, otherwise runs the real pipeline.
    fn panics_on_empty(payload: WorkerPayload, options: &CompressionOptions) -> Reply {
        if matches!(&payload, WorkerPayload::RawBytes { bytes, .. } if bytes.is_empty()) {
            panic!("empty payload");
        }
        process(payload, options)
    }

    /// A worker that swallows one job and exits without answering.
    fn dying_handle() -> WorkerHandle {
        let (requests, request_rx) = mpsc::channel::<WorkerRequest>();
        let (response_tx, response_rx) = mpsc::channel::<WorkerResponse>();
        let (ready_tx, _ready_rx) = mpsc::channel();
        let pending: PendingTable = Arc::default();
        let worker = thread::spawn(move || {
            let _job = request_rx.recv();
            drop(response_tx);
        });
        let dispatcher = {
            let pending = Arc::clone(&pending);
            thread::spawn(move || dispatch_loop(response_rx, pending, ready_tx))
        };
        WorkerHandle {
            requests,
            pending,
            worker,
            dispatcher,
        }
    }

    fn small_png_job() -> CompressionRequest {
        request(ImageSource::bytes(png_bytes(4, 4)), OutputFormat::Png, None, None)
    }

    #[test]
    fn panicking_job_fails_alone() {
        let w = BackgroundThread::with_job(Duration::from_secs(30), panics_on_empty);
        let bad = request(ImageSource::bytes(Vec::new()), OutputFormat::Png, None, None);
        let err = w.compress(&bad).unwrap_err();
        assert!(
            matches!(&err.cause, PipelineError::Surface(m) if m.contains("empty payload")),
            "{err}"
        );

        assert!(w.is_running());
        assert!(w.compress(&small_png_job()).is_ok());
        w.destroy();
    }

    #[test]
    fn worker_that_dies_mid_job_is_replaced() {
        let w = worker();
        *lock(&w.handle) = Some(dying_handle());

        let err = w.compress(&small_png_job()).unwrap_err();
        assert!(matches!(err.cause, PipelineError::Surface(_)));
        assert!(!w.is_running());

        assert!(w.compress(&small_png_job()).is_ok());
        assert!(w.is_running());
        w.destroy();
    }

    #[test]
    fn worker_found_dead_is_replaced_before_sending() {
        let w = worker();
        let handle = dying_handle();
        handle
            .requests
            .send(WorkerRequest::Compress {
                id: "swallowed".into(),
                payload: WorkerPayload::StringRef { value: "x".into() },
                options: CompressionOptions::default(),
            })
            .unwrap();
        while !handle.worker.is_finished() {
            thread::yield_now();
        }
        *lock(&w.handle) = Some(handle);

        assert!(w.compress(&small_png_job()).is_ok());
        w.destroy();
    }

    #[test]
    fn failed_handshake_returns_promptly() {
        for _ in 0..10 {
            match WorkerHandle::spawn(Duration::ZERO, process) {
                Ok(handle) => handle.shutdown(),
                Err(e) => assert_eq!(e, PipelineError::Timeout(Duration::ZERO)),
            }
        }
    }

    #[test]
    fn concurrent_callers_get_their_own_results() {
        let w = worker();
        thread::scope(|s| {
            let handles: Vec<_> = (1..=6u32)
                .map(|n| {
                    let w = &w;
                    s.spawn(move || {
                        let req = request(
                            ImageSource::Decoded(gradient_image(n * 10, n * 10)),
                            OutputFormat::Png,
                            None,
                            None,
                        );
                        let out = w.compress(&req).unwrap();
                        let img = raster::decode(&out.encoded).unwrap();
                        (n, img.width())
                    })
                })
                .collect();
            for h in handles {
                let (n, width) = h.join().unwrap();
                assert_eq!(width, n * 10);
            }
        });
        w.destroy();
    }

    #[test]
    fn destroy_then_compress_restarts() {
        let w = worker();
        let req = request(ImageSource::bytes(png_bytes(4, 4)), OutputFormat::Png, None, None);
        w.compress(&req).unwrap();
        w.destroy();
        w.destroy();
        w.compress(&req).unwrap();
        assert!(w.is_running());
        w.destroy();
    }

    #[test]
    fn dispatcher_ignores_unknown_ids() {
        let pending: PendingTable = Arc::default();
        let (known_tx, known_rx) = mpsc::channel();
        lock(&pending).insert("known".into(), known_tx);

        let (response_tx, response_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        response_tx.send(WorkerResponse::Ready).unwrap();
        response_tx
            .send(WorkerResponse::Success {
                id: "stranger".into(),
                encoded_buffer: vec![9],
            })
            .unwrap();
        response_tx
            .send(WorkerResponse::Success {
                id: "known".into(),
                encoded_buffer: vec![1, 2],
            })
            .unwrap();
        drop(response_tx);

        dispatch_loop(response_rx, Arc::clone(&pending), ready_tx);

        assert!(ready_rx.try_recv().is_ok());
        assert_eq!(known_rx.try_recv().unwrap(), Ok(vec![1, 2]));
        assert!(lock(&pending).is_empty());
    }

    #[test]
    fn timed_out_reply_is_unregistered() {
        let pending: PendingTable = Arc::default();
        let (tx, rx) = mpsc::channel();
        lock(&pending).insert("slow".into(), tx);

        let outcome = await_reply(&pending, "slow", rx, Duration::from_millis(10));
        assert_eq!(
            outcome,
            Some(Err(PipelineError::Timeout(Duration::from_millis(10))))
        );
        assert!(!lock(&pending).contains_key("slow"));

        // The late response now has nobody to go to.
        route(&pending, "slow", Ok(vec![1]));
    }

    #[test]
    fn dispatcher_exit_wakes_waiters() {
        let pending: PendingTable = Arc::default();
        let (tx, rx) = mpsc::channel();
        lock(&pending).insert("orphan".into(), tx);

        let (response_tx, response_rx) = mpsc::channel::<WorkerResponse>();
        let (ready_tx, _ready_rx) = mpsc::channel();
        drop(response_tx);
        dispatch_loop(response_rx, Arc::clone(&pending), ready_tx);

        assert_eq!(await_reply(&pending, "orphan", rx, Duration::from_secs(1)), None);
    }

    #[test]
    fn messages_have_the_documented_json_shape() {
        assert_eq!(
            serde_json::to_value(WorkerResponse::Ready).unwrap(),
            json!({"type": "ready"})
        );

        let request = WorkerRequest::Compress {
            id: "abc".into(),
            payload: WorkerPayload::RawBytes {
                bytes: vec![1],
                mime_type: Some("image/png".into()),
            },
            options: CompressionOptions::default(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "compress");
        assert_eq!(
            value["payload"],
            json!({"kind": "raw-bytes", "bytes": [1], "mimeType": "image/png"})
        );
        assert_eq!(value["options"]["format"], "webp");

        let success = WorkerResponse::Success {
            id: "abc".into(),
            encoded_buffer: vec![7],
        };
        assert_eq!(
            serde_json::to_value(success).unwrap(),
            json!({"type": "success", "id": "abc", "encodedBuffer": [7]})
        );

        let pixels = WorkerPayload::PixelBuffer {
            bytes: vec![0; 4],
            width: 1,
            height: 1,
        };
        assert_eq!(serde_json::to_value(pixels).unwrap()["kind"], "pixel-buffer");

        let error = WorkerResponse::Error {
            id: "abc".into(),
            message: "decode failed: x".into(),
            cause: PipelineError::Decode("x".into()),
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["cause"], json!({"kind": "decode", "detail": "x"}));
        let back: WorkerResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, error);
    }
}
