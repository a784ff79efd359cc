/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Hand-off of inbound messages from connection readers to session workers.
//!
//! Readers never run session logic themselves; they queue [`Work`] to a
//! worker task that processes it in arrival order.

use fixwire_session::{Inbound, Responder, Session, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default time a worker waits on its queue before rechecking the stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default depth of each worker queue.
pub const DEFAULT_DISPATCH_QUEUE_DEPTH: usize = 1024;

/// How sessions are mapped to worker tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One worker serves every session.
    #[default]
    SingleThreaded,
    /// One worker per bound session, created on bind and reaped on unbind.
    PerSession,
}

/// Unit of work for a session worker.
pub enum Work {
    /// Process one inbound item.
    Inbound {
        /// Target session.
        session: Arc<Session>,
        /// The decoded (or garbled) message.
        inbound: Inbound,
    },
    /// The connection behind `responder` has closed.
    Unbind {
        /// Target session.
        session: Arc<Session>,
        /// The connection's responder.
        responder: Arc<dyn Responder>,
    },
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound { session, inbound } => f
                .debug_struct("Inbound")
                .field("session", session.id())
                .field("inbound", inbound)
                .finish(),
            Self::Unbind { session, responder } => f
                .debug_struct("Unbind")
                .field("session", session.id())
                .field("remote", &responder.remote_address())
                .finish(),
        }
    }
}

struct Worker {
    tx: mpsc::Sender<Work>,
    handle: JoinHandle<()>,
}

/// Routes [`Work`] to worker tasks according to a [`DispatchMode`].
pub struct Dispatcher {
    mode: DispatchMode,
    queue_depth: usize,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    shared: Mutex<Option<Worker>>,
    per_session: Mutex<HashMap<SessionId, Worker>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mode", &self.mode)
            .field("queue_depth", &self.queue_depth)
            .field("poll_interval", &self.poll_interval)
            .field("workers", &self.worker_count())
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher. Workers are spawned on demand.
    #[must_use]
    pub fn new(mode: DispatchMode, queue_depth: usize, poll_interval: Duration) -> Self {
        Self {
            mode,
            queue_depth: queue_depth.max(1),
            poll_interval,
            stop: Arc::new(AtomicBool::new(false)),
            shared: Mutex::new(None),
            per_session: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Returns the queue feeding `id`'s worker, spawning the worker if needed.
    ///
    /// Returns `None` once the dispatcher is stopped.
    pub fn attach(&self, id: &SessionId) -> Option<mpsc::Sender<Work>> {
        if self.is_stopped() {
            return None;
        }
        match self.mode {
            DispatchMode::SingleThreaded => {
                let mut shared = self.shared.lock();
                let worker = shared.get_or_insert_with(|| self.spawn_worker("shared".to_string()));
                Some(worker.tx.clone())
            }
            DispatchMode::PerSession => {
                let mut workers = self.per_session.lock();
                let worker = workers
                    .entry(id.clone())
                    .or_insert_with(|| self.spawn_worker(id.to_string()));
                Some(worker.tx.clone())
            }
        }
    }

    /// Releases `id`'s dedicated worker once no connection holds a queue
    /// handle to it. Callers drop their own handle first. A worker still
    /// referenced by a newer connection stays registered and is released by
    /// that connection's own `detach`. A released worker exits once the
    /// queued work is done.
    pub fn detach(&self, id: &SessionId) {
        if self.mode != DispatchMode::PerSession {
            return;
        }
        let mut workers = self.per_session.lock();
        match workers.get(id) {
            Some(worker) if worker.tx.strong_count() == 1 => {
                workers.remove(id);
                debug!(session = %id, "released session worker");
            }
            Some(_) => debug!(session = %id, "session worker still attached"),
            None => {}
        }
    }

    /// Number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        let shared = usize::from(self.shared.lock().is_some());
        shared + self.per_session.lock().len()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Raises the stop flag and waits for every worker to exit. Work already
    /// dequeued is completed.
    pub async fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let mut handles: Vec<JoinHandle<()>> = self
            .per_session
            .lock()
            .drain()
            .map(|(_, worker)| worker.handle)
            .collect();
        if let Some(worker) = self.shared.lock().take() {
            handles.push(worker.handle);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "dispatch worker panicked");
            }
        }
        info!("dispatcher stopped");
    }

    fn spawn_worker(&self, name: String) -> Worker {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let handle = tokio::spawn(run_worker(name, rx, self.stop.clone(), self.poll_interval));
        Worker { tx, handle }
    }
}

async fn run_worker(
    name: String,
    mut rx: mpsc::Receiver<Work>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    debug!(worker = %name, "dispatch worker started");
    while !stop.load(Ordering::Acquire) {
        match tokio::time::timeout(poll_interval, rx.recv()).await {
            Ok(Some(work)) => process(work).await,
            Ok(None) => break,
            Err(_) => {}
        }
    }
    debug!(worker = %name, "dispatch worker exited");
}

async fn process(work: Work) {
    match work {
        Work::Inbound { session, inbound } => {
            if let Err(err) = session.next(inbound).await {
                warn!(session = %session.id(), %err, "error processing inbound message");
            }
        }
        Work::Unbind { session, responder } => {
            if let Err(err) = session.unbind(&responder).await {
                warn!(
                    session = %session.id(),
                    remote = %responder.remote_address(),
                    %err,
                    "error unbinding connection"
                );
            }
        }
    }
}
