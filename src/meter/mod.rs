//! Meter rendering: levels → segments, colors and peak-hold marker

pub mod bank;
pub mod layout;
pub mod renderer;

pub use bank::{MeterBank, RenderedMeter};
pub use layout::{LayoutKey, MeterLayout, Orientation, ScaleLabel};
pub use renderer::{MeterFrame, MeterRenderer, PeakHold, Segment, SegmentState, Zone};
