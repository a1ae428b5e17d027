//! Level producers that live in this process
//!
//! A real audio engine sits behind [`crate::ingest::LevelSource`]. This
//! module provides an in-process implementation and a synthetic engine
//! that drives it.

pub mod loopback;
pub mod simulator;

pub use loopback::{LoopbackSource, PollFacet};
pub use simulator::EngineSimulator;
