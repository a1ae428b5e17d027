//! Telemetry store: single source of truth for meter levels
//!
//! Copy-on-write behind a `RwLock<Arc<_>>`. A batch is applied to a private
//! copy and published by swapping the `Arc`, so readers always see a whole
//! snapshot and two reads between batches return the same allocation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::constants::SNAPSHOT_BROADCAST_CAPACITY;
use crate::telemetry::levels::{ChannelLevels, MasterLevels, PartialUpdate, TelemetrySnapshot};

/// Shared level state read by every meter
pub struct TelemetryStore {
    snapshot: RwLock<Arc<TelemetrySnapshot>>,

    /// Every published snapshot, for live subscribers
    updates_tx: broadcast::Sender<Arc<TelemetrySnapshot>>,

    /// Applied batches
    batches: AtomicU64,
}

impl TelemetryStore {
    /// Create an empty store (master zero-initialized)
    pub fn new() -> Self {
        let (updates_tx, _) = broadcast::channel(SNAPSHOT_BROADCAST_CAPACITY);
        Self {
            snapshot: RwLock::new(Arc::new(TelemetrySnapshot::default())),
            updates_tx,
            batches: AtomicU64::new(0),
        }
    }

    /// Atomically merge a batch into the snapshot.
    ///
    /// Writers are serialized by the write lock; readers never observe a
    /// partially applied batch.
    pub fn batch_update(&self, update: PartialUpdate) {
        if update.is_empty() {
            return;
        }

        let mut current = self.snapshot.write();
        let mut next = TelemetrySnapshot::clone(&current);
        let channels = update.channel_count();
        next.apply(update);

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        self.batches.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(version = next.version, channels, "Telemetry batch applied");

        // Sent under the lock so subscribers see versions in order
        let _ = self.updates_tx.send(next);
    }

    /// Current levels for a channel, or silence if unknown
    pub fn get_channel(&self, channel_id: u32) -> ChannelLevels {
        self.snapshot.read().channel(channel_id)
    }

    /// Current master levels
    pub fn get_master(&self) -> MasterLevels {
        self.snapshot.read().master
    }

    /// Immutable view of the whole state
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Live subscription to every published snapshot
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TelemetrySnapshot>> {
        self.updates_tx.subscribe()
    }

    /// Drop a channel entry; called when its meter is torn down
    pub fn remove_channel(&self, channel_id: u32) -> bool {
        let mut current = self.snapshot.write();
        if !current.channels.contains_key(&channel_id) {
            return false;
        }

        let mut next = TelemetrySnapshot::clone(&current);
        next.channels.remove(&channel_id);
        next.version += 1;

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        let _ = self.updates_tx.send(next);

        tracing::debug!(channel_id, "Channel removed from telemetry");
        true
    }

    /// Reset every level to silence (session end).
    ///
    /// Channel entries stay in place; only an explicit `remove_channel`
    /// deletes them.
    pub fn reset(&self) {
        let mut current = self.snapshot.write();
        let next = TelemetrySnapshot {
            channels: current.channels.keys().map(|&id| (id, ChannelLevels::SILENT)).collect(),
            master: ChannelLevels::SILENT,
            metrics: Default::default(),
            version: current.version + 1,
        };

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        let _ = self.updates_tx.send(next);

        tracing::debug!("Telemetry reset to silence");
    }

    /// Version of the current snapshot
    pub fn version(&self) -> u64 {
        self.snapshot.read().version
    }

    /// Batches applied through `batch_update`
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Known channel ids (unordered)
    pub fn channel_ids(&self) -> Vec<u32> {
        self.snapshot.read().channels.keys().copied().collect()
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}
