//! Meter geometry: segment size and scale label offsets
//!
//! Depends only on orientation and dimension, so it is computed when one
//! of those changes and shared as an `Arc` otherwise.

use serde::{Deserialize, Serialize};

use crate::config::MeterConfig;
use crate::levels::db_to_meter_position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Grows bottom → top
    #[default]
    Vertical,
    /// Grows left → right
    Horizontal,
}

impl Orientation {
    /// Pixel offset along the axis for a normalized position.
    ///
    /// Vertical offsets are measured from the top edge.
    pub fn offset(&self, position: f64, dimension: u32) -> f64 {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        match self {
            Orientation::Vertical => (1.0 - position) * dimension as f64,
            Orientation::Horizontal => position * dimension as f64,
        }
    }
}

/// What the layout depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutKey {
    pub orientation: Orientation,
    pub dimension: u32,
}

/// One dB mark on the scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleLabel {
    pub db: f64,
    pub text: String,
    /// Normalized position of the mark
    pub position: f64,
    /// Pixel offset along the orientation axis
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterLayout {
    pub key: LayoutKey,
    /// Pixel length of one segment
    pub segment_extent: f64,
    pub labels: Vec<ScaleLabel>,
}

impl MeterLayout {
    pub fn compute(key: LayoutKey, config: &MeterConfig) -> Self {
        let segments = config.segments.max(1);
        let labels = config
            .scale_marks
            .iter()
            .map(|&db| {
                let position = db_to_meter_position(db, config.min_db, config.max_db);
                ScaleLabel {
                    db,
                    text: format!("{}", db),
                    position,
                    offset: key.orientation.offset(position, key.dimension),
                }
            })
            .collect();

        Self {
            key,
            segment_extent: key.dimension as f64 / segments as f64,
            labels,
        }
    }

    pub fn offset(&self, position: f64) -> f64 {
        self.key.orientation.offset(position, self.key.dimension)
    }
}
