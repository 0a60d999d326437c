//! Worker-thread compute backend.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use terrastream_heightfield::{FieldError, HeightField};

use crate::backend::{BackendError, ComputeBackend, GenerationPoll, GenerationRequest, TaskHandle};

struct Job {
    handle: TaskHandle,
    request: GenerationRequest,
    cancel: Arc<AtomicBool>,
}

struct Done {
    handle: TaskHandle,
    cancelled: bool,
    result: Result<HeightField, FieldError>,
}

/// Generates height fields on a fixed set of named worker threads.
///
/// Jobs go out on one channel and results come back on another; the control
/// thread drains results during `poll`. Disposing a handle flags its job
/// cancelled and forgets it, so a result that arrives later finds no entry
/// and is dropped.
pub struct ThreadedBackend {
    tx_job: Option<Sender<Job>>,
    rx_done: Receiver<Done>,
    workers: Vec<JoinHandle<()>>,
    live: BTreeMap<TaskHandle, Arc<AtomicBool>>,
    finished: BTreeMap<TaskHandle, Result<HeightField, FieldError>>,
    next: u64,
}

impl ThreadedBackend {
    pub fn new(threads: usize) -> Result<Self, BackendError> {
        if threads == 0 {
            return Err(BackendError::Unavailable(
                "worker thread count must be at least 1".into(),
            ));
        }
        let (tx_job, rx_job) = crossbeam_channel::unbounded::<Job>();
        let (tx_done, rx_done) = crossbeam_channel::unbounded::<Done>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx_job = rx_job.clone();
            let tx_done = tx_done.clone();
            let worker = std::thread::Builder::new()
                .name(format!("terrain-gen-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx_job.recv() {
                        if job.cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        let result = job.request.generate();
                        let cancelled = job.cancel.load(Ordering::Relaxed);
                        if tx_done
                            .send(Done {
                                handle: job.handle,
                                cancelled,
                                result,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                })
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;
            workers.push(worker);
        }

        tracing::debug!(threads, "threaded backend started");
        Ok(Self {
            tx_job: Some(tx_job),
            rx_done,
            workers,
            live: BTreeMap::new(),
            finished: BTreeMap::new(),
            next: 0,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks submitted and not yet consumed or disposed.
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    fn drain_done(&mut self) -> Result<(), BackendError> {
        loop {
            match self.rx_done.try_recv() {
                Ok(done) => {
                    if done.cancelled || !self.live.contains_key(&done.handle) {
                        tracing::trace!(handle = %done.handle, "dropping late result");
                        continue;
                    }
                    self.finished.insert(done.handle, done.result);
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(BackendError::Disconnected),
            }
        }
    }
}

impl ComputeBackend for ThreadedBackend {
    fn name(&self) -> &str {
        "threaded"
    }

    fn probe(&mut self) -> Result<(), BackendError> {
        if self.tx_job.is_none() || self.workers.is_empty() {
            return Err(BackendError::Unavailable("no worker threads".into()));
        }
        if self.workers.iter().any(|w| w.is_finished()) {
            return Err(BackendError::Unavailable("worker thread exited".into()));
        }
        Ok(())
    }

    fn submit(&mut self, request: GenerationRequest) -> Result<TaskHandle, BackendError> {
        let tx = self.tx_job.as_ref().ok_or(BackendError::Disconnected)?;
        self.next += 1;
        let handle = TaskHandle(self.next);
        let cancel = Arc::new(AtomicBool::new(false));
        tx.send(Job {
            handle,
            request,
            cancel: cancel.clone(),
        })
        .map_err(|_| BackendError::Disconnected)?;
        self.live.insert(handle, cancel);
        Ok(handle)
    }

    fn poll(&mut self, handle: TaskHandle) -> GenerationPoll {
        if let Err(e) = self.drain_done() {
            if !self.finished.contains_key(&handle) {
                self.live.remove(&handle);
                return GenerationPoll::Failed(e);
            }
        }
        if let Some(result) = self.finished.remove(&handle) {
            self.live.remove(&handle);
            return match result {
                Ok(field) => GenerationPoll::Ready(field),
                Err(e) => GenerationPoll::Failed(e.into()),
            };
        }
        if self.live.contains_key(&handle) {
            GenerationPoll::Pending
        } else {
            GenerationPoll::Failed(BackendError::UnknownHandle(handle))
        }
    }

    fn dispose(&mut self, handle: TaskHandle) {
        if let Some(cancel) = self.live.remove(&handle) {
            cancel.store(true, Ordering::Relaxed);
        }
        self.finished.remove(&handle);
    }
}

impl Drop for ThreadedBackend {
    fn drop(&mut self) {
        for cancel in self.live.values() {
            cancel.store(true, Ordering::Relaxed);
        }
        self.tx_job.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
