//! The per-connection rate limiter: one token bucket, one priority queue,
//! and the worker task that ties them together.
//!
//! The worker is driven by three stimuli: a new request arriving on the
//! intake channel, a periodic tick, and the stop signal. Requests are only
//! enqueued on arrival; dispatch happens on the tick, which refills the
//! bucket and then drains as many top-of-heap requests as whole tokens
//! allow. Each admitted request runs on its own blocking task so a slow
//! caller function cannot stall refills or dispatch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::queue::{PendingQueue, PendingRequest};
use crate::token_bucket::TokenBucket;
use crate::RateLimit;

/// How often the worker refills tokens and drains admitted requests.
/// Worst-case admission latency for a ready request is one tick.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Intake buffer size. A full buffer blocks submitters until the worker
/// drains it; submission never drops or errors on a full buffer.
const INTAKE_CAPACITY: usize = 100;

/// The only way the throttling machinery itself can fail a caller.
///
/// Errors returned by the throttled function are not represented here; they
/// pass through to the caller as ordinary values.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ThrottleError {
    /// The limiter was stopped before the request could run.
    #[error("rate limiter was stopped before the request could run")]
    LimiterStopped,
}

struct LimiterState {
    bucket: TokenBucket,
    queue: PendingQueue,
}

/// Rate-limits and priority-orders requests for a single connection key.
///
/// Construction spawns the worker task, so a limiter must be created from
/// within a Tokio runtime. The limiter runs until [`stop`](Self::stop) is
/// called or the handle is dropped.
pub struct ConnectionRateLimiter {
    rate_limit: RateLimit,
    state: Arc<Mutex<LimiterState>>,
    intake: mpsc::Sender<PendingRequest>,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    next_seq: AtomicU64,
}

impl ConnectionRateLimiter {
    pub fn new(rate_limit: RateLimit) -> Self {
        let state = Arc::new(Mutex::new(LimiterState {
            bucket: TokenBucket::new(rate_limit),
            queue: PendingQueue::new(),
        }));
        let (intake, intake_rx) = mpsc::channel(INTAKE_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(run_worker(Arc::clone(&state), intake_rx, stop_rx));
        debug!(
            request_count = rate_limit.request_count,
            window_seconds = rate_limit.window_seconds,
            "connection rate limiter started"
        );

        Self {
            rate_limit,
            state,
            intake,
            stop_tx,
            stopped: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Queue `job` for execution with the given niceness and return the
    /// completion signal the submitter can await.
    ///
    /// The signal fires exactly once, after the job has finished running.
    /// Submission suspends while the intake buffer is full. Once the limiter
    /// has been stopped, submission fails instead of queueing a request that
    /// would never run.
    pub async fn submit(
        &self,
        job: impl FnOnce() + Send + 'static,
        niceness: i32,
    ) -> Result<oneshot::Receiver<()>, ThrottleError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ThrottleError::LimiterStopped);
        }

        let (done, done_rx) = oneshot::channel();
        let request = PendingRequest {
            job: Box::new(job),
            niceness,
            queued_at: Instant::now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            done,
        };

        // A send error means the worker has already shut down and closed the
        // intake channel.
        self.intake
            .send(request)
            .await
            .map_err(|_| ThrottleError::LimiterStopped)?;
        Ok(done_rx)
    }

    /// Stop the worker. Idempotent.
    ///
    /// Requests already handed to an execution task run to completion;
    /// everything still queued is dropped, waking its submitter with
    /// [`ThrottleError::LimiterStopped`].
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        debug!("connection rate limiter stopping");
    }

    /// The rate limit this limiter was created with.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }

    /// Number of requests currently queued and awaiting dispatch.
    pub fn queued(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Current token balance, as of the last refill.
    pub fn available_tokens(&self) -> f64 {
        self.lock_state().bucket.available()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().expect("limiter state lock poisoned")
    }
}

async fn run_worker(
    state: Arc<Mutex<LimiterState>>,
    mut intake: mpsc::Receiver<PendingRequest>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = intake.recv() => match received {
                Some(request) => {
                    let mut state = state.lock().expect("limiter state lock poisoned");
                    trace!(
                        niceness = request.niceness,
                        queued = state.queue.len() + 1,
                        "request enqueued"
                    );
                    state.queue.push(request);
                }
                // Limiter handle dropped without an explicit stop.
                None => break,
            },
            _ = ticker.tick() => {
                let mut state = state.lock().expect("limiter state lock poisoned");
                let LimiterState { bucket, queue } = &mut *state;
                bucket.refill(Instant::now());

                let mut dispatched = 0u32;
                while !queue.is_empty() && bucket.try_consume() {
                    let request = queue.pop().expect("queue checked non-empty");
                    dispatch(request);
                    dispatched += 1;
                }
                if dispatched > 0 {
                    trace!(dispatched, remaining = queue.len(), "dispatch burst");
                }
            }
            _ = stop_rx.changed() => break,
        }
    }

    // Fail everything still waiting so no submitter is left blocked on a
    // request that will never run: first the intake buffer, then whatever
    // made it into the queue. Dropping a request drops its completion
    // sender, which wakes the submitter with an error.
    intake.close();
    while let Ok(request) = intake.try_recv() {
        drop(request);
    }
    let mut state = state.lock().expect("limiter state lock poisoned");
    let abandoned = state.queue.len();
    state.queue.clear();
    if abandoned > 0 {
        debug!(abandoned, "dropped queued requests on stop");
    }
}

/// Hand one admitted request to its own execution task and signal completion
/// once the job has run. The submitter may have gone away, so the signal
/// send is best-effort.
fn dispatch(request: PendingRequest) {
    trace!(niceness = request.niceness, "dispatching request");
    let PendingRequest { job, done, .. } = request;
    tokio::task::spawn_blocking(move || {
        job();
        let _ = done.send(());
    });
}
