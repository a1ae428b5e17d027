//! Strategy selection with ordered fallback
//!
//! Ladder: streaming channel → discrete events → polling. A rung is tried
//! only if the capability probe claims it; a setup error or timeout moves
//! on to the next rung. Polling always succeeds, so selection never fails.
//! A stream the producer closes later is replaced the same way.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::MonitoringConfig;
use crate::error::TransportError;
use crate::ingest::{EventIngestion, IngestSink, LevelSource, PollingIngestion, StreamingIngestion};

/// Which ingestion mechanism is feeding the coalescer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Streaming,
    Events,
    Polling,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Streaming => write!(f, "streaming"),
            StrategyKind::Events => write!(f, "events"),
            StrategyKind::Polling => write!(f, "polling"),
        }
    }
}

/// First rung of the ladder to try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Streaming first, then events, then polling
    #[default]
    Auto,
    /// Skip streaming
    Events,
    /// Poll only
    Polling,
}

/// One rung of the ladder, running
enum Rung {
    Streaming(StreamingIngestion),
    Events(EventIngestion),
    Polling(PollingIngestion),
}

impl Rung {
    fn kind(&self) -> StrategyKind {
        match self {
            Rung::Streaming(_) => StrategyKind::Streaming,
            Rung::Events(_) => StrategyKind::Events,
            Rung::Polling(_) => StrategyKind::Polling,
        }
    }

    fn stop(self) {
        match self {
            Rung::Streaming(s) => s.stop(),
            Rung::Events(e) => e.stop(),
            Rung::Polling(p) => p.stop(),
        }
    }
}

struct Slot {
    kind: StrategyKind,
    rung: Option<Rung>,
}

/// The one strategy currently feeding the coalescer
///
/// If the producer closes the streaming channel while ingestion is still
/// active, a watcher task moves down the ladder (events, then polling)
/// and swaps the new rung in place.
pub struct ActiveIngestion {
    slot: Arc<Mutex<Slot>>,
    sink: IngestSink,
    watcher: Option<JoinHandle<()>>,
}

impl ActiveIngestion {
    fn new(rung: Rung, sink: IngestSink) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                kind: rung.kind(),
                rung: Some(rung),
            })),
            sink,
            watcher: None,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.slot.lock().kind
    }

    /// Frames (or poll results) forwarded, across fallbacks
    pub fn frames(&self) -> u64 {
        self.sink.frames()
    }

    /// Tear down: cancel timers, release subscriptions, close channels
    pub fn stop(self) {
        self.sink.deactivate();
        if let Some(watcher) = &self.watcher {
            watcher.abort();
        }
        let rung = self.slot.lock().rung.take();
        if let Some(rung) = rung {
            rung.stop();
        }
    }
}

/// Walk the fallback ladder and return the first strategy that starts.
pub async fn select_ingestion<S: LevelSource>(
    source: &Arc<S>,
    sink: IngestSink,
    config: &MonitoringConfig,
) -> ActiveIngestion {
    let capabilities = source.capabilities();
    tracing::debug!(
        streaming = capabilities.streaming,
        events = capabilities.events,
        preference = ?config.strategy,
        "Selecting ingestion strategy"
    );

    let allow_streaming = config.strategy == StrategyPreference::Auto;
    let rung = start_rung(source, sink.clone(), config, allow_streaming).await;

    let ended = match &rung {
        Rung::Streaming(streaming) => Some(streaming.ended()),
        _ => None,
    };
    let mut active = ActiveIngestion::new(rung, sink);

    if let Some(ended) = ended {
        active.watcher = Some(tokio::spawn(fall_back_when_closed(
            Arc::clone(source),
            active.sink.clone(),
            config.clone(),
            active.slot.clone(),
            ended,
        )));
    }
    active
}

async fn start_rung<S: LevelSource>(
    source: &Arc<S>,
    sink: IngestSink,
    config: &MonitoringConfig,
    allow_streaming: bool,
) -> Rung {
    let capabilities = source.capabilities();
    let setup_timeout = config.setup_timeout();

    if allow_streaming && capabilities.streaming {
        match tokio::time::timeout(setup_timeout, StreamingIngestion::start(source.as_ref(), sink.clone())).await {
            Ok(Ok(streaming)) => return Rung::Streaming(streaming),
            Ok(Err(e)) => tracing::warn!(error = %e, "Streaming channel unavailable, falling back to events"),
            Err(_) => tracing::warn!(
                error = %TransportError::Timeout(setup_timeout.as_millis() as u64),
                "Streaming channel setup hung, falling back to events"
            ),
        }
    }

    if config.strategy != StrategyPreference::Polling && capabilities.events {
        match tokio::time::timeout(setup_timeout, EventIngestion::start(source, sink.clone())).await {
            Ok(Ok(events)) => return Rung::Events(events),
            Ok(Err(e)) => tracing::warn!(error = %e, "Level events unavailable, falling back to polling"),
            Err(_) => tracing::warn!(
                error = %TransportError::Timeout(setup_timeout.as_millis() as u64),
                "Event subscription hung, falling back to polling"
            ),
        }
    }

    Rung::Polling(PollingIngestion::start(source.clone(), sink, config.poll_interval()))
}

async fn fall_back_when_closed<S: LevelSource>(
    source: Arc<S>,
    sink: IngestSink,
    config: MonitoringConfig,
    slot: Arc<Mutex<Slot>>,
    ended: Arc<Notify>,
) {
    ended.notified().await;
    if !sink.is_active() {
        return;
    }

    tracing::warn!(reason = %TransportError::Closed, "Level stream closed by producer, falling back");
    let rung = start_rung(&source, sink.clone(), &config, false).await;

    let mut slot = slot.lock();
    if !sink.is_active() {
        drop(slot);
        rung.stop();
        return;
    }
    tracing::info!(strategy = %rung.kind(), "Ingestion continues after stream close");
    slot.kind = rung.kind();
    // The closed stream's task has already exited
    slot.rung = Some(rung);
}
