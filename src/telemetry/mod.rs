//! Level state and its rate-limited update path

pub mod coalescer;
pub mod levels;
pub mod store;

pub use coalescer::UpdateCoalescer;
pub use levels::{ChannelLevels, MasterLevels, PartialUpdate, SideLevels, TelemetrySnapshot};
pub use store::TelemetryStore;
