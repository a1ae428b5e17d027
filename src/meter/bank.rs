//! All meters of a mixer view
//!
//! One renderer per target (master plus each channel present in the
//! snapshot). Geometry is shared across renderers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::MeterConfig;
use crate::meter::layout::{LayoutKey, MeterLayout, Orientation};
use crate::meter::renderer::{MeterFrame, MeterRenderer};
use crate::protocol::LevelTarget;
use crate::telemetry::{ChannelLevels, TelemetrySnapshot};

/// A rendered meter tagged with its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMeter {
    pub target: LevelTarget,
    pub frame: Arc<MeterFrame>,
}

pub struct MeterBank {
    config: Arc<MeterConfig>,
    layout: Arc<MeterLayout>,
    master: MeterRenderer,
    channels: BTreeMap<u32, MeterRenderer>,
}

impl MeterBank {
    pub fn new(config: MeterConfig) -> Self {
        let config = Arc::new(config);
        let key = LayoutKey {
            orientation: config.orientation,
            dimension: config.dimension,
        };
        let layout = Arc::new(MeterLayout::compute(key, &config));
        let master = MeterRenderer::with_layout(config.clone(), layout.clone());
        Self {
            config,
            layout,
            master,
            channels: BTreeMap::new(),
        }
    }

    /// Render every meter; master first, then channels by id
    pub fn render(&mut self, snapshot: &TelemetrySnapshot) -> Vec<RenderedMeter> {
        self.render_inner(snapshot, false)
    }

    /// Render every meter and return only those whose output changed
    pub fn render_changed(&mut self, snapshot: &TelemetrySnapshot) -> Vec<RenderedMeter> {
        self.render_inner(snapshot, true)
    }

    fn render_inner(&mut self, snapshot: &TelemetrySnapshot, only_changed: bool) -> Vec<RenderedMeter> {
        // Meters are torn down only when their channel leaves the snapshot
        self.channels.retain(|id, _| snapshot.channels.contains_key(id));

        let mut out = Vec::with_capacity(snapshot.channels.len() + 1);
        if let Some(frame) = render_one(&mut self.master, &snapshot.master, only_changed) {
            out.push(RenderedMeter {
                target: LevelTarget::Master,
                frame,
            });
        }

        let mut ids: Vec<u32> = snapshot.channels.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let renderer = self
                .channels
                .entry(id)
                .or_insert_with(|| MeterRenderer::with_layout(self.config.clone(), self.layout.clone()));
            if let Some(frame) = render_one(renderer, &snapshot.channel(id), only_changed) {
                out.push(RenderedMeter {
                    target: LevelTarget::Channel(id),
                    frame,
                });
            }
        }
        out
    }

    /// Change geometry for all meters
    pub fn resize(&mut self, orientation: Orientation, dimension: u32) {
        let key = LayoutKey { orientation, dimension };
        if self.layout.key == key {
            return;
        }
        self.layout = Arc::new(MeterLayout::compute(key, &self.config));
        self.master.set_layout(self.layout.clone());
        for renderer in self.channels.values_mut() {
            renderer.set_layout(self.layout.clone());
        }
    }

    pub fn layout(&self) -> &Arc<MeterLayout> {
        &self.layout
    }

    /// Channel meters currently alive
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn renderer(&self, target: LevelTarget) -> Option<&MeterRenderer> {
        match target {
            LevelTarget::Master => Some(&self.master),
            LevelTarget::Channel(id) => self.channels.get(&id),
        }
    }
}

fn render_one(renderer: &mut MeterRenderer, levels: &ChannelLevels, only_changed: bool) -> Option<Arc<MeterFrame>> {
    let previous = renderer.last_frame().cloned();
    let frame = renderer.render(levels.peak(), levels.rms());
    let changed = previous.map_or(true, |p| !Arc::ptr_eq(&p, &frame));
    (changed || !only_changed).then_some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{PartialUpdate, TelemetryStore};

    #[test]
    fn test_renders_master_and_channels_in_order() {
        let store = TelemetryStore::new();
        let mut update = PartialUpdate::channel(3, ChannelLevels::new(0.5, 0.3, 0.5, 0.3));
        update.merge(PartialUpdate::channel(1, ChannelLevels::new(0.2, 0.1, 0.2, 0.1)));
        update.merge(PartialUpdate::master(ChannelLevels::new(0.9, 0.6, 0.8, 0.5)));
        store.batch_update(update);

        let mut bank = MeterBank::new(MeterConfig::default());
        let meters = bank.render(&store.snapshot());
        let targets: Vec<_> = meters.iter().map(|m| m.target).collect();
        assert_eq!(
            targets,
            vec![LevelTarget::Master, LevelTarget::Channel(1), LevelTarget::Channel(3)]
        );
        assert!(meters[0].frame.peak_hold.is_some());
        assert_eq!(bank.channel_count(), 2);
    }

    #[test]
    fn test_only_changed_meters_are_reported() {
        let store = TelemetryStore::new();
        store.batch_update(PartialUpdate::channel(1, ChannelLevels::new(0.5, 0.3, 0.5, 0.3)));
        store.batch_update(PartialUpdate::channel(2, ChannelLevels::new(0.4, 0.2, 0.4, 0.2)));

        let mut bank = MeterBank::new(MeterConfig::default());
        assert_eq!(bank.render_changed(&store.snapshot()).len(), 3);

        // Jitter below the skip threshold on channel 1, real change on channel 2
        store.batch_update(PartialUpdate::channel(1, ChannelLevels::new(0.5004, 0.3, 0.5, 0.3)));
        store.batch_update(PartialUpdate::channel(2, ChannelLevels::new(0.8, 0.2, 0.4, 0.2)));
        let changed = bank.render_changed(&store.snapshot());
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].target, LevelTarget::Channel(2));
    }

    #[test]
    fn test_removed_channel_drops_renderer() {
        let store = TelemetryStore::new();
        store.batch_update(PartialUpdate::channel(1, ChannelLevels::new(0.5, 0.3, 0.5, 0.3)));
        store.batch_update(PartialUpdate::channel(2, ChannelLevels::new(0.5, 0.3, 0.5, 0.3)));

        let mut bank = MeterBank::new(MeterConfig::default());
        bank.render(&store.snapshot());
        assert_eq!(bank.channel_count(), 2);

        store.remove_channel(2);
        bank.render(&store.snapshot());
        assert_eq!(bank.channel_count(), 1);
        assert!(bank.renderer(LevelTarget::Channel(2)).is_none());
    }

    #[test]
    fn test_resize_shares_new_layout() {
        let store = TelemetryStore::new();
        store.batch_update(PartialUpdate::channel(1, ChannelLevels::new(0.5, 0.3, 0.5, 0.3)));

        let mut bank = MeterBank::new(MeterConfig::default());
        bank.render(&store.snapshot());
        bank.resize(Orientation::Horizontal, 120);

        let layout = bank.layout().clone();
        let channel = bank.renderer(LevelTarget::Channel(1)).unwrap();
        assert!(Arc::ptr_eq(channel.layout(), &layout));
        assert!(channel.last_frame().is_none());
        assert_eq!(bank.render_changed(&store.snapshot()).len(), 2);
    }
}
