//! Shared constants for the telemetry path

/// Decibel value treated as silence; anything at or below maps to linear 0
pub const DB_FLOOR: f64 = -60.0;

/// Top of the meter scale (digital full scale)
pub const DB_CEILING: f64 = 0.0;

/// Default number of meter segments
pub const DEFAULT_SEGMENTS: usize = 30;

/// Default coalescer flush interval (~30 Hz)
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 33;

/// Default polling interval for the pull fallback
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Shortest poll period the polling task accepts
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

/// How long a push transport may take to come up before we fall back
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 1000;

/// Normalized position where the yellow zone starts
pub const DEFAULT_YELLOW_THRESHOLD: f64 = 0.70;

/// Normalized position where the red zone starts
pub const DEFAULT_RED_THRESHOLD: f64 = 0.85;

/// Peak-hold marker is drawn only above this position
pub const DEFAULT_PEAK_HOLD_THRESHOLD: f64 = 0.8;

/// Level jitter below this is not re-rendered
pub const DEFAULT_SKIP_THRESHOLD: f64 = 0.001;

/// Default meter length in pixels
pub const DEFAULT_METER_DIMENSION: u32 = 200;

/// Fixed dB marks drawn next to the meter
pub const DEFAULT_SCALE_MARKS: [f64; 8] = [0.0, -6.0, -12.0, -18.0, -24.0, -30.0, -40.0, -60.0];

/// Entries kept by the dB → linear memo
pub const DEFAULT_CONVERTER_CACHE_SIZE: usize = 1024;

/// Capacity of the snapshot broadcast channel
pub const SNAPSHOT_BROADCAST_CAPACITY: usize = 64;

/// Capacity of the session command queue
pub const SESSION_COMMAND_CAPACITY: usize = 32;

/// Default HTTP/WebSocket port for the meter UI
pub const DEFAULT_HTTP_PORT: u16 = 8090;
