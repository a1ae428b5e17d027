//! Producer boundary: what the audio engine / command layer exposes
//!
//! The engine is an external collaborator running on its own threads. It
//! offers up to three delivery mechanisms; only polling is mandatory.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{ChannelLevelMap, EngineMetrics, LevelFrame, LevelTuple};

/// Ordered, backpressure-free stream of tagged frames
pub type FrameStream = mpsc::UnboundedReceiver<LevelFrame>;

/// Named discrete-event topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Per-channel level events
    #[serde(rename = "channel-level")]
    ChannelLevel,
    /// Master bus level events
    #[serde(rename = "master-level")]
    MasterLevel,
}

impl EventTopic {
    pub fn name(&self) -> &'static str {
        match self {
            EventTopic::ChannelLevel => "channel-level",
            EventTopic::MasterLevel => "master-level",
        }
    }
}

/// An active event subscription
#[derive(Debug)]
pub struct EventSubscription {
    pub id: u64,
    pub topic: EventTopic,
    pub events: mpsc::UnboundedReceiver<LevelFrame>,
}

/// What the producer claims to support.
///
/// A claim is only a hint: setup may still fail and trigger a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub events: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            events: true,
        }
    }
}

/// The engine side of the telemetry path
pub trait LevelSource: Send + Sync + 'static {
    /// Capability probe, evaluated on every (re)enable
    fn capabilities(&self) -> Capabilities;

    /// Establish the long-lived streaming channel
    fn open_stream(&self) -> impl Future<Output = Result<FrameStream, TransportError>> + Send;

    /// Subscribe to one discrete-event topic
    fn subscribe(&self, topic: EventTopic) -> impl Future<Output = Result<EventSubscription, TransportError>> + Send;

    /// Release a subscription; unknown ids are ignored
    fn unsubscribe(&self, subscription_id: u64);

    /// Pull: latest per-channel levels (dB)
    fn channel_levels(&self) -> impl Future<Output = Result<ChannelLevelMap, TransportError>> + Send;

    /// Pull: latest master levels (dB)
    fn master_levels(&self) -> impl Future<Output = Result<LevelTuple, TransportError>> + Send;

    /// Pull: engine metrics
    fn metrics(&self) -> impl Future<Output = Result<EngineMetrics, TransportError>> + Send;
}
