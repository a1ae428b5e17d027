//! Discrete-event ingestion
//!
//! Subscribes to the `channel-level` and `master-level` topics. A frame
//! that races an unsubscribe may still be applied once; that is harmless
//! because the store is last-write-wins per field.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::ingest::source::{EventTopic, LevelSource};
use crate::ingest::IngestSink;

/// Subscriptions held by one ingestion; released when dropped
///
/// Covers a setup that is abandoned halfway (error, timeout or task abort)
/// as well as a normal `stop`.
struct Subscriptions {
    ids: Vec<u64>,
    unsubscribe: Box<dyn Fn(u64) + Send + Sync>,
}

impl Subscriptions {
    fn new<S: LevelSource>(source: &Arc<S>) -> Self {
        let source = Arc::clone(source);
        Self {
            ids: Vec::with_capacity(2),
            unsubscribe: Box::new(move |id| source.unsubscribe(id)),
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            (self.unsubscribe)(id);
        }
    }
}

/// Active discrete-event ingestion
pub struct EventIngestion {
    task: JoinHandle<()>,
    sink: IngestSink,
    subscriptions: Subscriptions,
}

impl EventIngestion {
    /// Subscribe to both topics and start forwarding.
    ///
    /// Whatever was already subscribed is released if the other topic
    /// fails, or if this future is dropped before it completes.
    pub async fn start<S: LevelSource>(source: &Arc<S>, sink: IngestSink) -> Result<Self, TransportError> {
        let mut subscriptions = Subscriptions::new(source);

        let channel_sub = source.subscribe(EventTopic::ChannelLevel).await?;
        subscriptions.ids.push(channel_sub.id);
        let master_sub = source.subscribe(EventTopic::MasterLevel).await?;
        subscriptions.ids.push(master_sub.id);

        let mut channel_events = channel_sub.events;
        let mut master_events = master_sub.events;

        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(frame) = channel_events.recv() => frame,
                    Some(frame) = master_events.recv() => frame,
                    else => break,
                };
                if !task_sink.is_active() {
                    break;
                }
                task_sink.forward_frame(&frame);
            }
            tracing::debug!("Level event subscriptions ended");
        });

        tracing::info!(
            channel_topic = EventTopic::ChannelLevel.name(),
            master_topic = EventTopic::MasterLevel.name(),
            "Discrete-event ingestion active"
        );
        Ok(Self {
            task,
            sink,
            subscriptions,
        })
    }

    /// Frames forwarded so far
    pub fn frames(&self) -> u64 {
        self.sink.frames()
    }

    /// Release both subscriptions
    pub fn stop(self) {
        self.sink.deactivate();
        self.task.abort();
        let frames = self.sink.frames();
        drop(self.subscriptions);
        tracing::info!(frames, "Discrete-event ingestion stopped");
    }
}
