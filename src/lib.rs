//! VU level telemetry pipeline
//!
//! Carries peak/RMS measurements from a real-time audio engine to level
//! meters at a bounded, UI-safe rate:
//!
//! ```text
//! engine ─▶ ingest (streaming │ events │ polling) ─▶ levels::convert
//!        ─▶ telemetry::coalescer ─▶ telemetry::store ─▶ meter ─▶ ui
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod levels;
pub mod meter;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod ui;

pub use error::{Error, Result, TransportError};
