//! Message types exchanged with the audio engine and the meter UI
//!
//! ## Level frame
//!
//! ```text
//! ┌──────────────────────┬───────────┬──────────┬────────────┬───────────┬───────────┐
//! │ target               │ peak_left │ rms_left │ peak_right │ rms_right │ timestamp │
//! │ Channel(id) | Master │    dB     │    dB    │     dB     │    dB     │  µs mono  │
//! └──────────────────────┴───────────┴──────────┴────────────┴───────────┴───────────┘
//! ```
//!
//! All level fields are decibels (≤ 0 by convention, −60 dB floor). The
//! polling endpoints use the same unit: conversion to linear happens once,
//! at the ingestion boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

use crate::meter::RenderedMeter;
use crate::session::MonitoringStatus;
use crate::telemetry::TelemetrySnapshot;

/// Which meter a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "channel_id")]
pub enum LevelTarget {
    Channel(u32),
    Master,
}

impl std::fmt::Display for LevelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelTarget::Channel(id) => write!(f, "channel {}", id),
            LevelTarget::Master => write!(f, "master"),
        }
    }
}

/// One measurement tick from the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelFrame {
    pub target: LevelTarget,
    pub peak_left: f64,
    pub rms_left: f64,
    pub peak_right: f64,
    pub rms_right: f64,
    /// Monotonic engine time in microseconds; diagnostics only
    pub timestamp: u64,
}

impl LevelFrame {
    /// Frame for a mixer channel, stamped with the current monotonic time
    pub fn channel(channel_id: u32, peak_left: f64, rms_left: f64, peak_right: f64, rms_right: f64) -> Self {
        Self {
            target: LevelTarget::Channel(channel_id),
            peak_left,
            rms_left,
            peak_right,
            rms_right,
            timestamp: monotonic_micros(),
        }
    }

    /// Frame for the master bus
    pub fn master(peak_left: f64, rms_left: f64, peak_right: f64, rms_right: f64) -> Self {
        Self {
            target: LevelTarget::Master,
            peak_left,
            rms_left,
            peak_right,
            rms_right,
            timestamp: monotonic_micros(),
        }
    }

    /// The four dB values in wire order
    pub fn tuple(&self) -> LevelTuple {
        (self.peak_left, self.rms_left, self.peak_right, self.rms_right)
    }

    /// Age of the frame relative to the process clock
    pub fn age_micros(&self) -> u64 {
        monotonic_micros().saturating_sub(self.timestamp)
    }
}

/// `(peak_left, rms_left, peak_right, rms_right)` in dB
pub type LevelTuple = (f64, f64, f64, f64);

/// Per-channel level snapshot returned by the polling endpoint
pub type ChannelLevelMap = HashMap<u32, LevelTuple>;

/// Microseconds since the first call in this process
pub fn monotonic_micros() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}

/// Engine health counters, fetched alongside levels when polling
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub cpu_usage: f32,
    pub buffer_underruns: u64,
    pub buffer_overruns: u64,
    pub latency_ms: f32,
    pub sample_rate: u32,
    pub active_channels: u32,
    pub samples_processed: u64,
}

/// Control message types for WebSocket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ControlMessage {
    /// Turn level monitoring on or off
    SetMonitoring { enabled: bool },

    /// Tear down the meter for one channel
    RemoveChannel { channel_id: u32 },

    /// Request monitoring status
    GetStatus,

    /// Status response
    Status(MonitoringStatus),

    /// Request the full level snapshot
    GetSnapshot,

    /// Full level snapshot
    Snapshot(Arc<TelemetrySnapshot>),

    /// Meters whose rendered output changed since the last push
    Meters(Vec<RenderedMeter>),

    /// Error response
    Error { message: String },

    /// Ping for keepalive
    Ping,

    /// Pong response
    Pong,
}
