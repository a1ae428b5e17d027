//! Streaming-channel ingestion
//!
//! One long-lived ordered channel from the engine. Frames are converted and
//! forwarded in arrival order.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::ingest::source::LevelSource;
use crate::ingest::IngestSink;

/// Active streaming-channel ingestion
pub struct StreamingIngestion {
    task: JoinHandle<()>,
    sink: IngestSink,
    /// Signalled once when the forwarding task exits on its own
    ended: Arc<Notify>,
}

impl StreamingIngestion {
    /// Open the channel and start forwarding.
    ///
    /// A setup error is returned to the caller so it can fall back.
    pub async fn start<S: LevelSource>(source: &S, sink: IngestSink) -> Result<Self, TransportError> {
        let mut stream = source.open_stream().await?;

        let ended = Arc::new(Notify::new());
        let task_ended = ended.clone();
        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = stream.recv().await {
                if !task_sink.is_active() {
                    break;
                }
                task_sink.forward_frame(&frame);
            }
            tracing::debug!(reason = %TransportError::Closed, "Level stream ended");
            task_ended.notify_one();
        });

        tracing::info!("Streaming-channel ingestion active");
        Ok(Self { task, sink, ended })
    }

    /// Frames forwarded so far
    pub fn frames(&self) -> u64 {
        self.sink.frames()
    }

    /// False once the producer closed the channel
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Notified when the producer closes the channel
    pub fn ended(&self) -> Arc<Notify> {
        self.ended.clone()
    }

    /// Tear down the channel; no update is emitted afterwards
    pub fn stop(self) {
        self.sink.deactivate();
        self.task.abort();
        tracing::info!(frames = self.sink.frames(), "Streaming-channel ingestion stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LoopbackSource;
    use crate::levels::LevelConverter;
    use crate::protocol::LevelFrame;
    use crate::telemetry::{TelemetryStore, UpdateCoalescer};
    use std::time::Duration;

    fn sink(store: &Arc<TelemetryStore>) -> IngestSink {
        let coalescer = UpdateCoalescer::new(store.clone(), Duration::from_millis(10));
        IngestSink::new(coalescer, Arc::new(LevelConverter::new()))
    }

    #[tokio::test]
    async fn test_frames_reach_store() {
        let source = LoopbackSource::new();
        let store = Arc::new(TelemetryStore::new());
        let ingestion = StreamingIngestion::start(&source, sink(&store)).await.unwrap();

        source.publish(LevelFrame::channel(3, -12.0, -18.0, -10.0, -16.0));
        source.publish(LevelFrame::master(-6.0, -9.0, -6.0, -9.0));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!((store.get_channel(3).left.peak - 0.2512).abs() < 1e-4);
        assert!((store.get_master().left.peak - 0.5012).abs() < 1e-4);
        assert_eq!(ingestion.frames(), 2);
        ingestion.stop();
    }

    #[tokio::test]
    async fn test_setup_failure_is_reported() {
        let source = LoopbackSource::new();
        source.fail_stream_setup(true);
        let store = Arc::new(TelemetryStore::new());

        let result = StreamingIngestion::start(&source, sink(&store)).await;
        assert!(matches!(result, Err(TransportError::SetupFailed(_))));
    }

    #[tokio::test]
    async fn test_no_updates_after_stop() {
        let source = LoopbackSource::new();
        let store = Arc::new(TelemetryStore::new());
        let ingestion = StreamingIngestion::start(&source, sink(&store)).await.unwrap();

        source.publish(LevelFrame::channel(1, -6.0, -6.0, -6.0, -6.0));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let version = store.version();

        ingestion.stop();
        source.publish(LevelFrame::channel(1, -1.0, -1.0, -1.0, -1.0));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.version(), version);
    }

    #[tokio::test]
    async fn test_producer_close_is_signalled() {
        let source = LoopbackSource::new();
        let store = Arc::new(TelemetryStore::new());
        let ingestion = StreamingIngestion::start(&source, sink(&store)).await.unwrap();
        let ended = ingestion.ended();

        source.close_stream();
        tokio::time::timeout(Duration::from_millis(200), ended.notified())
            .await
            .unwrap();
        ingestion.stop();
    }
}
