//! In-process level producer
//!
//! Implements every delivery mechanism of [`LevelSource`] on top of plain
//! channels so the pipeline can run without a real audio engine. Each
//! mechanism can be switched off or made to fail, which is how the
//! fallback ladder is exercised.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::constants::DB_FLOOR;
use crate::error::TransportError;
use crate::ingest::{Capabilities, EventSubscription, EventTopic, FrameStream, LevelSource};
use crate::protocol::{ChannelLevelMap, EngineMetrics, LevelFrame, LevelTarget, LevelTuple};

/// One of the three pull requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollFacet {
    ChannelLevels,
    MasterLevels,
    Metrics,
}

const SILENT_TUPLE: LevelTuple = (DB_FLOOR, DB_FLOOR, DB_FLOOR, DB_FLOOR);

/// Channel-backed [`LevelSource`]
pub struct LoopbackSource {
    streaming_supported: AtomicBool,
    events_supported: AtomicBool,
    fail_stream: AtomicBool,
    fail_events: AtomicBool,
    hang_events: AtomicBool,
    failing_facets: Mutex<HashSet<PollFacet>>,

    /// Single consumer; a new `open_stream` replaces the previous one
    stream: Mutex<Option<mpsc::UnboundedSender<LevelFrame>>>,
    subscribers: DashMap<u64, (EventTopic, mpsc::UnboundedSender<LevelFrame>)>,
    next_subscription: AtomicU64,

    /// Latest values in dB, served to polling
    channels: RwLock<ChannelLevelMap>,
    master: RwLock<LevelTuple>,
    metrics: RwLock<EngineMetrics>,

    published: AtomicU64,
}

impl LoopbackSource {
    pub fn new() -> Self {
        Self {
            streaming_supported: AtomicBool::new(true),
            events_supported: AtomicBool::new(true),
            fail_stream: AtomicBool::new(false),
            fail_events: AtomicBool::new(false),
            hang_events: AtomicBool::new(false),
            failing_facets: Mutex::new(HashSet::new()),
            stream: Mutex::new(None),
            subscribers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
            channels: RwLock::new(ChannelLevelMap::new()),
            master: RwLock::new(SILENT_TUPLE),
            metrics: RwLock::new(EngineMetrics::default()),
            published: AtomicU64::new(0),
        }
    }

    /// Emit one frame through every open mechanism and record it for polling
    pub fn publish(&self, frame: LevelFrame) {
        let topic = match frame.target {
            LevelTarget::Channel(id) => {
                self.channels.write().insert(id, frame.tuple());
                EventTopic::ChannelLevel
            }
            LevelTarget::Master => {
                *self.master.write() = frame.tuple();
                EventTopic::MasterLevel
            }
        };

        {
            let mut stream = self.stream.lock();
            if let Some(tx) = stream.as_ref() {
                if tx.send(frame).is_err() {
                    *stream = None;
                }
            }
        }

        for entry in self.subscribers.iter() {
            let (sub_topic, tx) = entry.value();
            if *sub_topic == topic {
                let _ = tx.send(frame);
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_metrics(&self, metrics: EngineMetrics) {
        *self.metrics.write() = metrics;
    }

    /// Forget a channel on the producer side (it stops appearing in polls)
    pub fn drop_channel(&self, channel_id: u32) {
        self.channels.write().remove(&channel_id);
    }

    /// Close the streaming channel from the producer side
    pub fn close_stream(&self) {
        self.stream.lock().take();
    }

    pub fn set_streaming_supported(&self, supported: bool) {
        self.streaming_supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_events_supported(&self, supported: bool) {
        self.events_supported.store(supported, Ordering::SeqCst);
    }

    /// Claim streaming but fail when the channel is opened
    pub fn fail_stream_setup(&self, fail: bool) {
        self.fail_stream.store(fail, Ordering::SeqCst);
    }

    /// Claim events but fail the `master-level` subscription
    pub fn fail_event_setup(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    /// Claim events but never answer the `master-level` subscription
    pub fn hang_event_setup(&self, hang: bool) {
        self.hang_events.store(hang, Ordering::SeqCst);
    }

    pub fn fail_facet(&self, facet: PollFacet, fail: bool) {
        let mut failing = self.failing_facets.lock();
        if fail {
            failing.insert(facet);
        } else {
            failing.remove(&facet);
        }
    }

    /// Live event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn check_facet(&self, facet: PollFacet) -> Result<(), TransportError> {
        if self.failing_facets.lock().contains(&facet) {
            return Err(TransportError::RequestFailed(format!("{:?} unavailable", facet)));
        }
        Ok(())
    }
}

impl Default for LoopbackSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelSource for LoopbackSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: self.streaming_supported.load(Ordering::SeqCst),
            events: self.events_supported.load(Ordering::SeqCst),
        }
    }

    async fn open_stream(&self) -> Result<FrameStream, TransportError> {
        if !self.streaming_supported.load(Ordering::SeqCst) {
            return Err(TransportError::Unsupported("streaming channel"));
        }
        if self.fail_stream.load(Ordering::SeqCst) {
            return Err(TransportError::SetupFailed("level channel rejected".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream.lock() = Some(tx);
        Ok(rx)
    }

    async fn subscribe(&self, topic: EventTopic) -> Result<EventSubscription, TransportError> {
        if !self.events_supported.load(Ordering::SeqCst) {
            return Err(TransportError::Unsupported("discrete events"));
        }
        if topic == EventTopic::MasterLevel && self.fail_events.load(Ordering::SeqCst) {
            return Err(TransportError::SetupFailed(format!("cannot subscribe to {}", topic.name())));
        }
        if topic == EventTopic::MasterLevel && self.hang_events.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, (topic, tx));
        Ok(EventSubscription { id, topic, events: rx })
    }

    fn unsubscribe(&self, subscription_id: u64) {
        self.subscribers.remove(&subscription_id);
    }

    async fn channel_levels(&self) -> Result<ChannelLevelMap, TransportError> {
        self.check_facet(PollFacet::ChannelLevels)?;
        Ok(self.channels.read().clone())
    }

    async fn master_levels(&self) -> Result<LevelTuple, TransportError> {
        self.check_facet(PollFacet::MasterLevels)?;
        Ok(*self.master.read())
    }

    async fn metrics(&self) -> Result<EngineMetrics, TransportError> {
        self.check_facet(PollFacet::Metrics)?;
        Ok(*self.metrics.read())
    }
}
