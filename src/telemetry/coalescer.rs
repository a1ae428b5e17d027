//! Update coalescer between ingestion and the store
//!
//! Engine-rate updates (which can exceed 1 kHz on the streaming path) are
//! merged into a pending batch and flushed to the store at most once per
//! interval. Nothing is sampled away: every field of every incoming update
//! is represented in the next flush.
//!
//! ```text
//! push ──▶ merge into pending ──▶ interval elapsed & no timer? ──yes──▶ flush now
//!                                          │
//!                                          no ──▶ timer pending? ──no──▶ arm one timer
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::telemetry::levels::PartialUpdate;
use crate::telemetry::store::TelemetryStore;

/// State owned exclusively by the coalescer
#[derive(Default)]
struct CoalescerState {
    pending: PartialUpdate,
    last_flush: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    closed: bool,
}

/// Rate limiter in front of the telemetry store
pub struct UpdateCoalescer {
    store: Arc<TelemetryStore>,
    interval: Duration,
    state: Mutex<CoalescerState>,
    pushes: AtomicU64,
    flushes: AtomicU64,
}

impl UpdateCoalescer {
    /// Create a coalescer flushing into `store` at most once per `interval`
    pub fn new(store: Arc<TelemetryStore>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            interval,
            state: Mutex::new(CoalescerState::default()),
            pushes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    /// Merge an update and flush now or schedule the single pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn push(self: &Arc<Self>, update: PartialUpdate) {
        let mut state = self.state.lock();
        if state.closed {
            tracing::trace!("Update after close discarded");
            return;
        }

        self.pushes.fetch_add(1, Ordering::Relaxed);
        state.pending.merge(update);

        if state.timer.is_some() {
            return;
        }

        let now = Instant::now();
        let elapsed = state.last_flush.map(|t| now.duration_since(t));
        match elapsed {
            Some(elapsed) if elapsed < self.interval => {
                let remaining = self.interval - elapsed;
                let this = Arc::clone(self);
                state.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(remaining).await;
                    this.on_timer();
                }));
            }
            _ => self.flush_locked(&mut state, now),
        }
    }

    fn on_timer(&self) {
        let mut state = self.state.lock();
        state.timer = None;
        if state.closed {
            return;
        }
        self.flush_locked(&mut state, Instant::now());
    }

    fn flush_locked(&self, state: &mut CoalescerState, now: Instant) {
        let pending = std::mem::take(&mut state.pending);
        state.last_flush = Some(now);
        if pending.is_empty() {
            return;
        }

        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.store.batch_update(pending);
    }

    /// Stop accepting updates, cancel the timer and drop anything pending
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending = PartialUpdate::default();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Updates accepted so far
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Flushes delivered to the store
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for UpdateCoalescer {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}
