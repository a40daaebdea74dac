//! Dispatch bridge between update intake and the handler runtime.
//!
//! All handler work runs on one dedicated OS thread (`quiz-dispatch`) that
//! owns a current-thread tokio runtime. Intake threads (the HTTP server, the
//! polling loop) hand jobs over through a channel and never wait for the work
//! itself.
//!
//! Capacity bounds jobs in flight, queued or running: each submitted job holds
//! a semaphore permit until it finishes.
//!
//! Ordering: jobs submitted for the same user run one after another in
//! submission order; jobs for different users interleave freely.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// A unit of handler work.
pub type Job = BoxFuture<'static, ()>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Initialization has not completed yet
    #[error("dispatch bridge is not ready")]
    NotReady,

    /// Every slot is taken by an unfinished job; the caller should retry later
    #[error("dispatch queue is full")]
    Busy,

    /// The worker thread is gone
    #[error("dispatch worker has stopped")]
    Stopped,

    #[error("startup job did not finish within {0:?}")]
    Timeout(Duration),

    #[error("failed to start dispatch worker: {0}")]
    Spawn(String),
}

impl DispatchError {
    /// Metric label for a refused submission.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Busy => "busy",
            Self::Stopped => "stopped",
            Self::Timeout(_) => "timeout",
            Self::Spawn(_) => "spawn",
        }
    }
}

struct Envelope {
    user_id: Option<i64>,
    job: Job,
}

/// Handle to the dispatch worker. Dropping every clone stops the worker.
#[derive(Clone)]
pub struct DispatchBridge {
    tx: mpsc::Sender<Envelope>,
    slots: Arc<Semaphore>,
    capacity: usize,
    ready: Arc<AtomicBool>,
}

impl DispatchBridge {
    /// Start the worker thread, allowing `capacity` unfinished jobs at once.
    pub fn start(capacity: usize) -> Result<Self, DispatchError> {
        let capacity = capacity.max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("quiz-dispatch")
            .build()
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        let (tx, rx) = mpsc::channel(capacity);
        thread::Builder::new()
            .name("quiz-dispatch".to_string())
            .spawn(move || {
                runtime.block_on(worker(rx));
                log::info!("Dispatch worker exited");
            })
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        log::info!("Dispatch worker started (capacity {})", capacity);
        Ok(Self {
            tx,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Submitted jobs that have not finished yet, queued or running.
    pub fn queue_depth(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hand a job to the worker without waiting.
    ///
    /// Jobs with the same `user_id` keep their submission order.
    pub fn submit(&self, user_id: Option<i64>, job: Job) -> Result<(), DispatchError> {
        if !self.is_ready() {
            return Err(DispatchError::NotReady);
        }
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| DispatchError::Busy)?;
        let job = hold_until_done(permit, job);
        self.tx.try_send(Envelope { user_id, job }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::Busy,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Stopped,
        })
    }

    /// Like `submit`, but waits for a free slot instead of failing with `Busy`.
    pub async fn submit_wait(&self, user_id: Option<i64>, job: Job) -> Result<(), DispatchError> {
        if !self.is_ready() {
            return Err(DispatchError::NotReady);
        }
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Stopped)?;
        let job = hold_until_done(permit, job);
        self.tx
            .send(Envelope { user_id, job })
            .await
            .map_err(|_| DispatchError::Stopped)
    }

    /// Run `fut` on the worker and wait up to `limit` for its output.
    ///
    /// Accepted before readiness; this is how initialization itself runs.
    pub async fn run<F, T>(&self, fut: F, limit: Duration) -> Result<T, DispatchError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(fut.await);
        });

        let handoff = async {
            self.tx
                .send(Envelope { user_id: None, job })
                .await
                .map_err(|_| DispatchError::Stopped)?;
            done_rx.await.map_err(|_| DispatchError::Stopped)
        };

        tokio::time::timeout(limit, handoff)
            .await
            .map_err(|_| DispatchError::Timeout(limit))?
    }
}

/// The permit is released when the job completes or unwinds.
fn hold_until_done(permit: OwnedSemaphorePermit, job: Job) -> Job {
    Box::pin(async move {
        let _permit = permit;
        job.await;
    })
}

async fn worker(mut rx: mpsc::Receiver<Envelope>) {
    // Last job spawned per user; the next one for that user waits on it.
    let mut tails: HashMap<i64, JoinHandle<()>> = HashMap::new();

    while let Some(Envelope { user_id, job }) = rx.recv().await {
        tails.retain(|_, handle| !handle.is_finished());

        match user_id {
            Some(user_id) => {
                let previous = tails.remove(&user_id);
                let handle = tokio::spawn(async move {
                    if let Some(previous) = previous {
                        if let Err(e) = previous.await {
                            log::error!("Previous job for user {} failed: {}", user_id, e);
                        }
                    }
                    job.await;
                });
                tails.insert(user_id, handle);
            }
            None => {
                tokio::spawn(job);
            }
        }
    }
}
