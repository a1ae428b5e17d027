//! Linear level state held by the telemetry store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::EngineMetrics;

/// Peak and RMS for one side of a stereo pair, linear [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SideLevels {
    pub peak: f64,
    pub rms: f64,
}

impl SideLevels {
    pub const SILENT: Self = Self { peak: 0.0, rms: 0.0 };

    /// Both values clamped to [0, 1]; NaN becomes 0.
    ///
    /// `rms <= peak` is not enforced, producers may briefly violate it.
    pub fn new(peak: f64, rms: f64) -> Self {
        Self {
            peak: clamp_unit(peak),
            rms: clamp_unit(rms),
        }
    }
}

#[inline]
fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Resident state for one mixer channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub left: SideLevels,
    pub right: SideLevels,
}

/// The master bus has the same shape as a channel
pub type MasterLevels = ChannelLevels;

impl ChannelLevels {
    pub const SILENT: Self = Self {
        left: SideLevels::SILENT,
        right: SideLevels::SILENT,
    };

    pub fn new(peak_left: f64, rms_left: f64, peak_right: f64, rms_right: f64) -> Self {
        Self {
            left: SideLevels::new(peak_left, rms_left),
            right: SideLevels::new(peak_right, rms_right),
        }
    }

    /// Mono peak for callers that don't need stereo detail
    pub fn peak(&self) -> f64 {
        (self.left.peak + self.right.peak) / 2.0
    }

    /// Mono RMS for callers that don't need stereo detail
    pub fn rms(&self) -> f64 {
        (self.left.rms + self.right.rms) / 2.0
    }

    pub fn is_silent(&self) -> bool {
        *self == Self::SILENT
    }
}

/// A batch of changes headed for the store.
///
/// Channel entries are merged per id (last write wins); master and metrics
/// have no sub-keys and are replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate {
    pub channels: Option<HashMap<u32, ChannelLevels>>,
    pub master: Option<MasterLevels>,
    pub metrics: Option<EngineMetrics>,
}

impl PartialUpdate {
    /// Update touching a single channel
    pub fn channel(channel_id: u32, levels: ChannelLevels) -> Self {
        Self {
            channels: Some(HashMap::from([(channel_id, levels)])),
            ..Default::default()
        }
    }

    /// Update touching only the master bus
    pub fn master(levels: MasterLevels) -> Self {
        Self {
            master: Some(levels),
            ..Default::default()
        }
    }

    /// Fold a newer update into this one
    pub fn merge(&mut self, newer: PartialUpdate) {
        if let Some(channels) = newer.channels {
            self.channels.get_or_insert_with(HashMap::new).extend(channels);
        }
        if newer.master.is_some() {
            self.master = newer.master;
        }
        if newer.metrics.is_some() {
            self.metrics = newer.metrics;
        }
    }

    /// Nothing to apply. An empty channel map counts as nothing.
    pub fn is_empty(&self) -> bool {
        self.channels.as_ref().map_or(true, HashMap::is_empty) && self.master.is_none() && self.metrics.is_none()
    }

    /// Number of channel entries carried
    pub fn channel_count(&self) -> usize {
        self.channels.as_ref().map_or(0, HashMap::len)
    }
}

/// The store's full state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub channels: HashMap<u32, ChannelLevels>,
    pub master: MasterLevels,
    pub metrics: EngineMetrics,
    /// Incremented once per applied batch
    pub version: u64,
}

impl TelemetrySnapshot {
    /// Apply a batch in place. Callers are responsible for publishing the
    /// result atomically.
    pub(crate) fn apply(&mut self, update: PartialUpdate) {
        if let Some(channels) = update.channels {
            self.channels.extend(channels);
        }
        if let Some(master) = update.master {
            self.master = master;
        }
        if let Some(metrics) = update.metrics {
            self.metrics = metrics;
        }
        self.version += 1;
    }

    /// Levels for a channel, silence if unknown
    pub fn channel(&self, channel_id: u32) -> ChannelLevels {
        self.channels.get(&channel_id).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_clamped() {
        let levels = ChannelLevels::new(1.5, -0.2, f64::NAN, 0.3);
        assert_eq!(levels.left.peak, 1.0);
        assert_eq!(levels.left.rms, 0.0);
        assert_eq!(levels.right.peak, 0.0);
        assert_eq!(levels.right.rms, 0.3);
    }

    #[test]
    fn test_rms_above_peak_is_kept() {
        let side = SideLevels::new(0.2, 0.4);
        assert_eq!(side.rms, 0.4);
    }

    #[test]
    fn test_mono_compat_fields() {
        let levels = ChannelLevels::new(0.4, 0.2, 0.6, 0.1);
        assert!((levels.peak() - 0.5).abs() < 1e-12);
        assert!((levels.rms() - 0.15).abs() < 1e-12);
        assert!(ChannelLevels::SILENT.is_silent());
        assert!(!levels.is_silent());
    }

    #[test]
    fn test_merge_last_write_wins_per_channel() {
        let mut pending = PartialUpdate::channel(1, ChannelLevels::new(0.1, 0.1, 0.1, 0.1));
        pending.merge(PartialUpdate::channel(2, ChannelLevels::new(0.2, 0.2, 0.2, 0.2)));
        pending.merge(PartialUpdate::channel(1, ChannelLevels::new(0.3, 0.3, 0.3, 0.3)));
        pending.merge(PartialUpdate::master(ChannelLevels::new(0.5, 0.4, 0.5, 0.4)));

        let channels = pending.channels.as_ref().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[&1].left.peak, 0.3);
        assert_eq!(channels[&2].left.peak, 0.2);
        assert_eq!(pending.master.unwrap().left.peak, 0.5);
    }

    #[test]
    fn test_merge_keeps_master_when_newer_has_none() {
        let mut pending = PartialUpdate::master(ChannelLevels::new(0.5, 0.4, 0.5, 0.4));
        pending.merge(PartialUpdate::channel(9, ChannelLevels::SILENT));
        assert!(pending.master.is_some());
        assert_eq!(pending.channel_count(), 1);
    }

    #[test]
    fn test_empty_update() {
        assert!(PartialUpdate::default().is_empty());
        let empty_map = PartialUpdate {
            channels: Some(HashMap::new()),
            ..Default::default()
        };
        assert!(empty_map.is_empty());
        assert!(!PartialUpdate::master(ChannelLevels::SILENT).is_empty());
    }

    #[test]
    fn test_snapshot_apply_bumps_version() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(PartialUpdate::channel(4, ChannelLevels::new(0.5, 0.25, 0.5, 0.25)));
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.channel(4).left.rms, 0.25);
        assert!(snapshot.channel(99).is_silent());
    }
}
