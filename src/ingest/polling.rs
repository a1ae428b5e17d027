//! Polling ingestion: the fallback that works without producer cooperation
//!
//! Every tick issues three independent requests in parallel (channel
//! levels, master levels, engine metrics). A failed facet is replaced by
//! its zero value; the others still go through. Responses that resolve
//! after `stop` are discarded.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants::MIN_POLL_INTERVAL_MS;
use crate::ingest::source::LevelSource;
use crate::ingest::IngestSink;
use crate::levels::LevelConverter;
use crate::telemetry::{ChannelLevels, PartialUpdate};

/// Active polling ingestion
pub struct PollingIngestion {
    task: JoinHandle<()>,
    sink: IngestSink,
    interval: Duration,
}

impl PollingIngestion {
    /// Start polling every `interval`. The first poll happens immediately.
    ///
    /// A zero interval is raised to `MIN_POLL_INTERVAL_MS`.
    pub fn start<S: LevelSource>(source: Arc<S>, sink: IngestSink, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !task_sink.is_active() {
                    break;
                }

                let update = poll_once(source.as_ref(), task_sink.converter()).await;

                // Session may have ended while the requests were in flight
                if !task_sink.is_active() {
                    tracing::debug!("Discarding poll response from a stopped session");
                    break;
                }
                task_sink.forward_update(update);
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "Polling ingestion active");
        Self { task, sink, interval }
    }

    /// Polls forwarded so far
    pub fn polls(&self) -> u64 {
        self.sink.frames()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel the timer and any in-flight poll
    pub fn stop(self) {
        self.sink.deactivate();
        self.task.abort();
        tracing::info!(polls = self.sink.frames(), "Polling ingestion stopped");
    }
}

/// Run one poll: three facets concurrently, merged into one update.
///
/// Never fails; each failed facet yields its empty/zero value.
pub async fn poll_once<S: LevelSource>(source: &S, converter: &LevelConverter) -> PartialUpdate {
    let (channels, master, metrics) = tokio::join!(source.channel_levels(), source.master_levels(), source.metrics());

    let channels = channels.unwrap_or_else(|e| {
        tracing::warn!(facet = "channel-levels", error = %e, "Level poll failed");
        Default::default()
    });
    let master = match master {
        Ok(tuple) => converter.tuple_levels(tuple),
        Err(e) => {
            tracing::warn!(facet = "master-levels", error = %e, "Level poll failed");
            ChannelLevels::SILENT
        }
    };
    let metrics = metrics.unwrap_or_else(|e| {
        tracing::warn!(facet = "metrics", error = %e, "Metrics poll failed");
        Default::default()
    });

    PartialUpdate {
        channels: Some(
            channels
                .into_iter()
                .map(|(id, tuple)| (id, converter.tuple_levels(tuple)))
                .collect(),
        ),
        master: Some(master),
        metrics: Some(metrics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LoopbackSource, PollFacet};
    use crate::protocol::LevelFrame;
    use crate::telemetry::{TelemetryStore, UpdateCoalescer};

    #[tokio::test]
    async fn test_poll_once_merges_all_facets() {
        let source = LoopbackSource::new();
        source.publish(LevelFrame::channel(1, -6.0, -12.0, -6.0, -12.0));
        source.publish(LevelFrame::channel(2, -60.0, -60.0, -60.0, -60.0));
        source.publish(LevelFrame::master(-1.0, -2.0, -1.0, -2.0));

        let update = poll_once(&source, &LevelConverter::new()).await;
        let channels = update.channels.unwrap();
        assert_eq!(channels.len(), 2);
        assert!((channels[&1].left.peak - 0.5012).abs() < 1e-4);
        assert!(channels[&2].is_silent());
        assert!(update.master.unwrap().left.peak > 0.89);
        assert!(update.metrics.is_some());
    }

    #[tokio::test]
    async fn test_failed_facet_does_not_block_others() {
        let source = LoopbackSource::new();
        source.publish(LevelFrame::channel(7, -6.0, -12.0, -6.0, -12.0));
        source.publish(LevelFrame::master(-1.0, -2.0, -1.0, -2.0));
        source.fail_facet(PollFacet::MasterLevels, true);

        let update = poll_once(&source, &LevelConverter::new()).await;
        assert_eq!(update.channels.as_ref().unwrap().len(), 1);
        assert!(update.master.unwrap().is_silent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_until_stopped() {
        let source = Arc::new(LoopbackSource::new());
        source.publish(LevelFrame::channel(1, -6.0, -12.0, -6.0, -12.0));

        let store = Arc::new(TelemetryStore::new());
        let coalescer = UpdateCoalescer::new(store.clone(), Duration::from_millis(10));
        let sink = IngestSink::new(coalescer, Arc::new(LevelConverter::new()));
        let polling = PollingIngestion::start(source.clone(), sink, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(175)).await;
        let polls = polling.polls();
        assert_eq!(polls, 4);
        assert!(store.get_channel(1).left.peak > 0.5);

        polling.stop();
        let version = store.version();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.version(), version);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let source = Arc::new(LoopbackSource::new());
        source.publish(LevelFrame::channel(2, -6.0, -12.0, -6.0, -12.0));

        let store = Arc::new(TelemetryStore::new());
        let coalescer = UpdateCoalescer::new(store.clone(), Duration::from_millis(10));
        let sink = IngestSink::new(coalescer, Arc::new(LevelConverter::new()));
        let polling = PollingIngestion::start(source, sink, Duration::ZERO);
        assert_eq!(polling.interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(polling.polls() > 1);
        assert!(store.get_channel(2).left.peak > 0.5);
        polling.stop();
    }
}
