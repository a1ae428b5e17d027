//! Синтетический аудио-движок
//!
//! Отдельный поток, который с заданной частотой публикует уровни для
//! нескольких каналов и мастер-шины через [`LoopbackSource`]. Уровни
//! модулируются синусом, чтобы на индикаторах было видно движение.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SimulatorConfig;
use crate::constants::DB_FLOOR;
use crate::engine::LoopbackSource;
use crate::error::{Error, Result};
use crate::levels::linear_to_db;
use crate::protocol::{EngineMetrics, LevelFrame};

/// Частота дискретизации, о которой сообщают метрики
const SIMULATED_SAMPLE_RATE: u32 = 48_000;

/// Генератор уровней в отдельном потоке
pub struct EngineSimulator {
    source: Arc<LoopbackSource>,
    config: SimulatorConfig,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl EngineSimulator {
    pub fn new(source: Arc<LoopbackSource>, config: SimulatorConfig) -> Self {
        Self {
            source,
            config,
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Запустить поток генерации (повторный вызов ничего не делает)
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let source = self.source.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let ticks = self.ticks.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("engine-simulator".to_string())
            .spawn(move || {
                Self::generator_loop(source, config, running, ticks);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::Io(e)
            })?;

        self.thread_handle = Some(handle);
        tracing::info!(
            channels = self.config.channels,
            rate_hz = self.config.rate_hz,
            "Engine simulator started"
        );
        Ok(())
    }

    fn generator_loop(source: Arc<LoopbackSource>, config: SimulatorConfig, running: Arc<AtomicBool>, ticks: Arc<AtomicU64>) {
        let period = Duration::from_secs_f64(1.0 / config.rate_hz.max(1) as f64);
        let started = Instant::now();
        let mut samples_processed = 0u64;

        while running.load(Ordering::Relaxed) {
            let tick_start = Instant::now();
            let t = started.elapsed().as_secs_f64();

            let mut master_peak = 0.0f64;
            let mut master_rms = 0.0f64;
            for channel in 0..config.channels {
                let (peak, rms) = Self::synth_levels(channel, t);
                master_peak = master_peak.max(peak);
                master_rms = master_rms.max(rms);

                // Правый канал слегка отстаёт по фазе
                let (peak_r, rms_r) = Self::synth_levels(channel, t + 0.05);
                source.publish(LevelFrame::channel(
                    channel,
                    linear_to_db(peak),
                    linear_to_db(rms),
                    linear_to_db(peak_r),
                    linear_to_db(rms_r),
                ));
            }

            let master_db = if config.channels == 0 { DB_FLOOR } else { linear_to_db(master_peak) };
            let master_rms_db = if config.channels == 0 { DB_FLOOR } else { linear_to_db(master_rms) };
            source.publish(LevelFrame::master(master_db, master_rms_db, master_db, master_rms_db));

            samples_processed += (SIMULATED_SAMPLE_RATE as f64 * period.as_secs_f64()) as u64;
            source.set_metrics(EngineMetrics {
                cpu_usage: (5.0 + 2.0 * (t * 0.3).sin()) as f32,
                buffer_underruns: 0,
                buffer_overruns: 0,
                latency_ms: 10.7,
                sample_rate: SIMULATED_SAMPLE_RATE,
                active_channels: config.channels,
                samples_processed,
            });

            ticks.fetch_add(1, Ordering::Relaxed);

            if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    /// Линейные (peak, rms) для канала в момент `t`
    fn synth_levels(channel: u32, t: f64) -> (f64, f64) {
        let rate = 0.4 + channel as f64 * 0.17;
        let phase = channel as f64 * 1.3;
        let envelope = 0.5 + 0.5 * (t * rate * std::f64::consts::TAU + phase).sin();
        let peak = (0.05 + 0.9 * envelope).min(1.0);
        (peak, peak * 0.6)
    }

    /// Остановить поток и дождаться его завершения
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!(ticks = self.ticks(), "Engine simulator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Сколько циклов генерации выполнено
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for EngineSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::LevelSource;

    #[test]
    fn test_synth_levels_in_range() {
        for channel in 0..8 {
            for step in 0..100 {
                let (peak, rms) = EngineSimulator::synth_levels(channel, step as f64 * 0.037);
                assert!((0.0..=1.0).contains(&peak));
                assert!(rms <= peak);
            }
        }
    }

    #[tokio::test]
    async fn test_simulator_publishes_all_channels() {
        let source = Arc::new(LoopbackSource::new());
        let config = SimulatorConfig {
            channels: 3,
            rate_hz: 200,
            ..Default::default()
        };
        let mut simulator = EngineSimulator::new(source.clone(), config);
        simulator.start().unwrap();
        assert!(simulator.is_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        simulator.stop();
        assert!(!simulator.is_running());
        assert!(simulator.ticks() > 0);

        let levels = source.channel_levels().await.unwrap();
        assert_eq!(levels.len(), 3);
        let metrics = source.metrics().await.unwrap();
        assert_eq!(metrics.active_channels, 3);
        assert_eq!(metrics.sample_rate, SIMULATED_SAMPLE_RATE);

        let published = source.published();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(source.published(), published);
    }
}
