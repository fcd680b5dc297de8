//! Background resource creation.
//!
//! A [`CreationWorker`] owns a second device context sharing the primary
//! context's namespace and runs on a dedicated thread. The producer only
//! enqueues declared resources; the worker only creates device objects,
//! never binds or draws.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::context::{DeviceContext, Namespace};
use crate::error::StateError;
use crate::resources::{ResourceHandle, ResourceState};

struct CreateRequest {
    resource: ResourceHandle,
    done: mpsc::Sender<bool>,
}

struct WorkQueue {
    requests: Mutex<VecDeque<CreateRequest>>,
    signal: Condvar,
    stop: AtomicBool,
}

/// Completion signal for one background creation request.
#[derive(Debug)]
pub struct CreationTicket {
    resource: ResourceHandle,
    done: mpsc::Receiver<bool>,
}

impl CreationTicket {
    /// The resource being created.
    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    /// Wait up to `timeout` for the request to be processed.
    ///
    /// Returns `Some(true)` if the device object was created, `Some(false)` if
    /// creation failed (the failure itself was logged and swallowed) and
    /// `None` if the request was still unprocessed when the wait ended.
    pub fn wait(&self, timeout: Duration) -> Option<bool> {
        match self.done.recv_timeout(timeout) {
            Ok(created) => Some(created),
            Err(RecvTimeoutError::Timeout) => None,
            // Worker gone without answering; report what actually happened.
            Err(RecvTimeoutError::Disconnected) => Some(self.resource.is_live()),
        }
    }
}

/// The worker did not exit within the shutdown timeout.
///
/// Carries the join handle so the caller decides whether to keep waiting or
/// to abandon the thread.
#[derive(Debug)]
pub struct WorkerTimeout {
    handle: JoinHandle<usize>,
}

impl WorkerTimeout {
    /// Returns `true` once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker exits. Returns the number of requests it processed.
    pub fn join(self) -> thread::Result<usize> {
        self.handle.join()
    }
}

impl std::fmt::Display for WorkerTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "creation worker did not stop in time")
    }
}

impl std::error::Error for WorkerTimeout {}

/// Creates declared resources on a background thread.
pub struct CreationWorker {
    queue: Arc<WorkQueue>,
    namespace: Namespace,
    handle: Option<JoinHandle<usize>>,
    exited: mpsc::Receiver<()>,
    shutdown_timeout: Duration,
}

impl CreationWorker {
    /// Spawn a worker whose context shares `primary`'s namespace.
    ///
    /// Blocks until the worker context is current on the new thread.
    pub fn spawn(primary: &DeviceContext) -> Result<Self, StateError> {
        let context = primary.new_shared()?;
        let namespace = context.namespace();
        let poll_interval = primary.config().worker_poll_interval;
        let shutdown_timeout = primary.config().worker_shutdown_timeout;

        let queue = Arc::new(WorkQueue {
            requests: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StateError>>();
        let (exit_tx, exit_rx) = mpsc::channel::<()>();

        let worker_queue = Arc::clone(&queue);
        let handle = thread::Builder::new()
            .name("bindstream-creation".into())
            .spawn(move || {
                if let Err(e) = context.make_current() {
                    let _ = ready_tx.send(Err(e));
                    let _ = exit_tx.send(());
                    return 0;
                }
                let _ = ready_tx.send(Ok(()));
                let processed = run_creation_loop(&context, &worker_queue, poll_interval);
                let _ = context.release_current();
                drop(context);
                let _ = exit_tx.send(());
                processed
            })
            .map_err(|e| {
                StateError::ResourceExhausted(format!("failed to spawn creation worker: {e}"))
            })?;

        ready_rx.recv().map_err(|_| {
            StateError::InvalidOperation("creation worker died during startup".to_string())
        })??;

        log::info!("Creation worker started for namespace {namespace}");
        Ok(Self {
            queue,
            namespace,
            handle: Some(handle),
            exited: exit_rx,
            shutdown_timeout,
        })
    }

    /// Queue a declared resource for creation on the worker thread.
    ///
    /// Never blocks beyond taking the queue lock.
    pub fn create_async(&self, resource: &ResourceHandle) -> Result<CreationTicket, StateError> {
        if resource.namespace() != self.namespace {
            return Err(StateError::InvalidArgument(format!(
                "resource {} belongs to namespace {}, worker uses {}",
                resource.id(),
                resource.namespace(),
                self.namespace
            )));
        }
        if resource.state() != ResourceState::Pending {
            return Err(StateError::InvalidArgument(format!(
                "resource {} is {:?}, not pending creation",
                resource.id(),
                resource.state()
            )));
        }

        let (done, ticket) = mpsc::channel();
        {
            // Checked under the queue lock so the worker never exits past a request.
            let mut requests = self.queue.requests.lock();
            if self.queue.stop.load(Ordering::Acquire) {
                return Err(StateError::InvalidOperation(
                    "creation worker is shutting down".to_string(),
                ));
            }
            requests.push_back(CreateRequest {
                resource: resource.clone(),
                done,
            });
        }
        self.queue.signal.notify_one();

        Ok(CreationTicket {
            resource: resource.clone(),
            done: ticket,
        })
    }

    /// Number of requests not yet picked up by the worker.
    pub fn queued(&self) -> usize {
        self.queue.requests.lock().len()
    }

    /// Stop the worker after it drains the queue.
    ///
    /// Returns the number of requests processed, or [`WorkerTimeout`] if the
    /// worker is still running after `timeout`.
    pub fn shutdown(mut self, timeout: Duration) -> Result<usize, WorkerTimeout> {
        self.stop(timeout)
    }

    fn stop(&mut self, timeout: Duration) -> Result<usize, WorkerTimeout> {
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };

        {
            let _requests = self.queue.requests.lock();
            self.queue.stop.store(true, Ordering::Release);
        }
        self.queue.signal.notify_all();

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(WorkerTimeout { handle }),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let processed = handle.join().unwrap_or_else(|_| {
                    log::error!("Creation worker panicked");
                    0
                });
                log::info!("Creation worker stopped after {processed} requests");
                Ok(processed)
            }
        }
    }
}

impl Drop for CreationWorker {
    fn drop(&mut self) {
        if let Err(timeout) = self.stop(self.shutdown_timeout) {
            log::warn!(
                "{timeout} ({:?}); detaching worker thread",
                self.shutdown_timeout
            );
        }
    }
}

impl std::fmt::Debug for CreationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationWorker")
            .field("namespace", &self.namespace)
            .field("queued", &self.queued())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run_creation_loop(context: &DeviceContext, queue: &WorkQueue, poll_interval: Duration) -> usize {
    let mut processed = 0;
    loop {
        let request = {
            let mut requests = queue.requests.lock();
            loop {
                if let Some(request) = requests.pop_front() {
                    break Some(request);
                }
                if queue.stop.load(Ordering::Acquire) {
                    break None;
                }
                queue.signal.wait_for(&mut requests, poll_interval);
            }
        };
        let Some(request) = request else {
            return processed;
        };

        let created = match context.lifecycle().create_declared(context, &request.resource) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Background creation of resource {} ({:?}) failed: {e}",
                    request.resource.id(),
                    request.resource.label()
                );
                false
            }
        };
        processed += 1;
        let _ = request.done.send(created);
    }
}

static_assertions::assert_impl_all!(CreationWorker: Send);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{ContextConfig, ResourceDescriptor, TextureDescriptor};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_worker_creates_in_shared_namespace() {
        let backend = Arc::new(DummyBackend::new());
        let primary = DeviceContext::new(backend.clone(), ContextConfig::default()).unwrap();
        let worker = CreationWorker::spawn(&primary).unwrap();

        let texture = primary.declare_resource(TextureDescriptor::new_2d(16, 16));
        let ticket = worker.create_async(&texture).unwrap();
        assert_eq!(ticket.wait(WAIT), Some(true));
        assert!(texture.is_live());
        assert!(backend.is_live(texture.object().unwrap()));

        assert!(matches!(
            worker.create_async(&texture),
            Err(StateError::InvalidArgument(_))
        ));
        assert_eq!(worker.shutdown(WAIT).unwrap(), 1);
    }

    #[test]
    fn test_requests_after_stop_are_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let primary = DeviceContext::new(backend.clone(), ContextConfig::default()).unwrap();
        let mut worker = CreationWorker::spawn(&primary).unwrap();

        let early = primary.declare_resource(TextureDescriptor::new_2d(4, 4));
        let ticket = worker.create_async(&early).unwrap();
        assert_eq!(worker.stop(WAIT).unwrap(), 1);
        assert_eq!(ticket.wait(WAIT), Some(true));

        let late = primary.declare_resource(TextureDescriptor::new_2d(4, 4));
        assert!(matches!(
            worker.create_async(&late),
            Err(StateError::InvalidOperation(_))
        ));
        assert_eq!(worker.queued(), 0);
        assert_eq!(late.state(), ResourceState::Pending);
    }

    #[test]
    fn test_foreign_resource_is_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let primary = DeviceContext::new(backend.clone(), ContextConfig::default()).unwrap();
        let other = DeviceContext::new(backend, ContextConfig::default()).unwrap();
        let worker = CreationWorker::spawn(&primary).unwrap();

        let foreign = other.declare_resource(ResourceDescriptor::program());
        assert!(matches!(
            worker.create_async(&foreign),
            Err(StateError::InvalidArgument(_))
        ));
    }
}
