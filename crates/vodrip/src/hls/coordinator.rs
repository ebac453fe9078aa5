// HLS Download Coordinator: a fixed pool of workers draining one shared
// segment queue. A job is finished once the queue is empty and no worker
// holds a segment.

use crate::DownloadError;
use crate::hls::error::SegmentError;
use crate::hls::events::{DownloadEvent, EventCallback};
use crate::hls::fetcher::SegmentFetcher;
use crate::hls::playlist::{EncryptionKey, Segment};
use crate::hls::retry::RetryPolicy;
use crate::hls::store::SegmentStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub segment: Segment,
    /// Effective key (own or inherited) resolved when the job was queued.
    pub key: Option<EncryptionKey>,
    /// Attempts already made.
    pub attempts: u32,
}

impl PendingSegment {
    pub fn new(segment: Segment, key: Option<EncryptionKey>) -> Self {
        Self {
            segment,
            key,
            attempts: 0,
        }
    }
}

#[derive(Debug, Default)]
struct JobState {
    pending: VecDeque<PendingSegment>,
    in_flight: usize,
}

enum Claim {
    Segment(PendingSegment),
    /// Queue is empty but other workers may still requeue.
    Wait,
    Done,
}

/// Result of a completed pool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    pub completed: usize,
    /// Positions whose retry budget ran out, ascending.
    pub abandoned: Vec<usize>,
}

pub struct SegmentCoordinator {
    state: Mutex<JobState>,
    completed: AtomicUsize,
    abandoned: Mutex<Vec<usize>>,
    idle: Notify,
    total: usize,
    fetcher: SegmentFetcher,
    store: Arc<dyn SegmentStore>,
    retry_policy: RetryPolicy,
    events: Option<EventCallback>,
    cancel: CancellationToken,
}

impl SegmentCoordinator {
    pub fn new(
        segments: Vec<PendingSegment>,
        fetcher: SegmentFetcher,
        store: Arc<dyn SegmentStore>,
        retry_policy: RetryPolicy,
        events: Option<EventCallback>,
        cancel: CancellationToken,
    ) -> Self {
        let total = segments.len();
        Self {
            state: Mutex::new(JobState {
                pending: segments.into(),
                in_flight: 0,
            }),
            completed: AtomicUsize::new(0),
            abandoned: Mutex::new(Vec::new()),
            idle: Notify::new(),
            total,
            fetcher,
            store,
            retry_policy,
            events,
            cancel,
        }
    }

    /// Run `concurrency` workers until every segment is stored or abandoned.
    pub async fn run(self: Arc<Self>, concurrency: usize) -> Result<PoolOutcome, DownloadError> {
        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency.max(1) {
            let this = Arc::clone(&self);
            workers.spawn(async move { this.worker(worker_id).await });
        }

        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Segment worker terminated abnormally");
                // The failed worker may still count as in flight; stop the rest.
                self.cancel.cancel();
                panicked.get_or_insert(e.to_string());
            }
        }

        if let Some(reason) = panicked {
            return Err(DownloadError::Worker(reason));
        }
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let mut abandoned = std::mem::take(&mut *self.abandoned.lock());
        abandoned.sort_unstable();
        Ok(PoolOutcome {
            completed: self.completed.load(Ordering::SeqCst),
            abandoned,
        })
    }

    fn claim(&self) -> Claim {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(pending) => {
                state.in_flight += 1;
                Claim::Segment(pending)
            }
            None if state.in_flight == 0 => Claim::Done,
            None => Claim::Wait,
        }
    }

    async fn worker(&self, worker_id: usize) {
        debug!(worker_id, "Segment worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Register interest before inspecting the queue so a requeue
            // between the check and the wait is not missed.
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut pending = match self.claim() {
                Claim::Done => break,
                Claim::Wait => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = notified.as_mut() => continue,
                    }
                }
                Claim::Segment(pending) => pending,
            };

            let index = pending.segment.index;
            let attempt = pending.attempts + 1;
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.fetch_and_store(&pending) => result,
            };

            match result {
                Ok(bytes) => {
                    self.state.lock().in_flight -= 1;
                    let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(
                        worker_id,
                        index,
                        bytes,
                        completed,
                        total = self.total,
                        "Segment stored"
                    );
                    self.emit(DownloadEvent::SegmentCompleted {
                        index,
                        bytes,
                        completed,
                        total: self.total,
                    });
                }
                Err(e) => {
                    let will_retry = self.retry_policy.allows_retry(attempt);
                    warn!(worker_id, index, attempt, will_retry, error = %e, "Segment failed");
                    self.emit(DownloadEvent::SegmentFailed {
                        index,
                        attempt,
                        error: e.to_string(),
                        will_retry,
                    });

                    if will_retry {
                        let delay = self.retry_policy.delay_for_attempt(attempt - 1);
                        if !delay.is_zero() {
                            tokio::select! {
                                _ = self.cancel.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        pending.attempts = attempt;
                        let mut state = self.state.lock();
                        state.pending.push_back(pending);
                        state.in_flight -= 1;
                    } else {
                        error!(index, attempts = attempt, "Giving up on segment");
                        self.abandoned.lock().push(index);
                        self.state.lock().in_flight -= 1;
                        self.emit(DownloadEvent::SegmentAbandoned {
                            index,
                            attempts: attempt,
                        });
                    }
                }
            }

            self.idle.notify_waiters();
        }
        debug!(worker_id, "Segment worker finished");
    }

    async fn fetch_and_store(&self, pending: &PendingSegment) -> Result<usize, SegmentError> {
        let data = self
            .fetcher
            .fetch(&pending.segment, pending.key.as_ref())
            .await?;
        let len = data.len();
        self.store.put(pending.segment.index, data).await?;
        Ok(len)
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }
}
