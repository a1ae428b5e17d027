//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::ingest::StrategyPreference;
use crate::meter::Orientation;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ingestion and coalescing
    pub monitoring: MonitoringConfig,

    /// Meter rendering
    pub meter: MeterConfig,

    /// UI configuration
    pub ui: UiConfig,

    /// Synthetic engine used by the monitor binary
    pub simulator: SimulatorConfig,
}

/// Ingestion and coalescing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Minimum spacing between store writes
    pub flush_interval_ms: u64,

    /// Polling period when polling is the active strategy
    pub poll_interval_ms: u64,

    /// How long a push strategy may take to set up before falling back
    pub setup_timeout_ms: u64,

    /// First rung of the fallback ladder
    pub strategy: StrategyPreference,

    /// dB → linear memoization entries (0 disables the cache)
    pub converter_cache_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            strategy: StrategyPreference::Auto,
            converter_cache_size: DEFAULT_CONVERTER_CACHE_SIZE,
        }
    }
}

impl MonitoringConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }
}

/// Meter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Number of segments per bar
    pub segments: usize,

    /// Bottom of the display range in dB
    pub min_db: f64,

    /// Top of the display range in dB
    pub max_db: f64,

    /// Segment position where yellow starts
    pub yellow_threshold: f64,

    /// Segment position where red starts
    pub red_threshold: f64,

    /// Peak position above which the hold indicator is shown
    pub peak_hold_threshold: f64,

    /// Level changes smaller than this are not re-rendered
    pub skip_threshold: f64,

    /// dB values labelled on the scale
    pub scale_marks: Vec<f64>,

    pub orientation: Orientation,

    /// Bar length in pixels along the orientation axis
    pub dimension: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            segments: DEFAULT_SEGMENTS,
            min_db: DB_FLOOR,
            max_db: DB_CEILING,
            yellow_threshold: DEFAULT_YELLOW_THRESHOLD,
            red_threshold: DEFAULT_RED_THRESHOLD,
            peak_hold_threshold: DEFAULT_PEAK_HOLD_THRESHOLD,
            skip_threshold: DEFAULT_SKIP_THRESHOLD,
            scale_marks: DEFAULT_SCALE_MARKS.to_vec(),
            orientation: Orientation::Vertical,
            dimension: DEFAULT_METER_DIMENSION,
        }
    }
}

/// UI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Bind address for web server
    pub bind_address: String,

    /// HTTP server port (WebSocket shares it)
    pub http_port: u16,

    /// Enable CORS
    pub enable_cors: bool,

    /// Static files directory
    pub static_dir: Option<PathBuf>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            enable_cors: true,
            static_dir: None,
        }
    }
}

/// Synthetic engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Number of mixer channels to generate
    pub channels: u32,

    /// Frames per second per channel
    pub rate_hz: u32,

    /// Offer the streaming channel
    pub streaming: bool,

    /// Offer discrete events
    pub events: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            rate_hz: 60,
            streaming: true,
            events: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vu-telemetry", "vu-monitor")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let m = &self.monitoring;
        if m.flush_interval_ms == 0 {
            return Err(crate::Error::Config("monitoring.flush_interval_ms must be > 0".into()));
        }
        if m.poll_interval_ms == 0 {
            return Err(crate::Error::Config("monitoring.poll_interval_ms must be > 0".into()));
        }
        if m.setup_timeout_ms == 0 {
            return Err(crate::Error::Config("monitoring.setup_timeout_ms must be > 0".into()));
        }

        let meter = &self.meter;
        if meter.segments == 0 {
            return Err(crate::Error::Config("meter.segments must be > 0".into()));
        }
        if !(meter.min_db < meter.max_db) {
            return Err(crate::Error::Config(format!(
                "meter.min_db ({}) must be below meter.max_db ({})",
                meter.min_db, meter.max_db
            )));
        }
        let ordered = 0.0 <= meter.yellow_threshold
            && meter.yellow_threshold <= meter.red_threshold
            && meter.red_threshold <= 1.0;
        if !ordered {
            return Err(crate::Error::Config(
                "meter thresholds must satisfy 0 <= yellow <= red <= 1".into(),
            ));
        }
        if meter.dimension == 0 {
            return Err(crate::Error::Config("meter.dimension must be > 0".into()));
        }

        if self.simulator.rate_hz == 0 {
            return Err(crate::Error::Config("simulator.rate_hz must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.monitoring.flush_interval(), Duration::from_millis(33));
        assert_eq!(config.meter.segments, 30);
        assert_eq!(config.meter.min_db, -60.0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [monitoring]
            poll_interval_ms = 100
            strategy = "polling"

            [meter]
            segments = 20
            orientation = "horizontal"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitoring.poll_interval_ms, 100);
        assert_eq!(config.monitoring.strategy, StrategyPreference::Polling);
        assert_eq!(config.monitoring.flush_interval_ms, DEFAULT_FLUSH_INTERVAL_MS);
        assert_eq!(config.meter.segments, 20);
        assert_eq!(config.meter.orientation, Orientation::Horizontal);
        assert_eq!(config.ui.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.meter.min_db = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.meter.yellow_threshold = 0.9;
        config.meter.red_threshold = 0.8;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.monitoring.flush_interval_ms = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("vu-telemetry-{}", uuid::Uuid::new_v4()))
            .join("config.toml");

        let mut config = AppConfig::default();
        config.simulator.channels = 3;
        config.ui.static_dir = Some(PathBuf::from("web"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
