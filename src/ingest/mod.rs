//! Стратегии приёма уровней от аудио-движка
//!
//! Три взаимоисключающих механизма доставки:
//! - потоковый канал (push, упорядоченный, без обратного давления)
//! - дискретные события (push, две темы: `channel-level` и `master-level`)
//! - опрос (pull, три независимых запроса по таймеру)
//!
//! В каждый момент активна ровно одна стратегия, и только она пишет в
//! коалесцер. Выбор делается заново при каждом включении мониторинга.

pub mod events;
pub mod polling;
pub mod source;
pub mod strategy;
pub mod streaming;

pub use events::EventIngestion;
pub use polling::{poll_once, PollingIngestion};
pub use source::{Capabilities, EventSubscription, EventTopic, FrameStream, LevelSource};
pub use strategy::{select_ingestion, ActiveIngestion, StrategyKind, StrategyPreference};
pub use streaming::StreamingIngestion;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::levels::LevelConverter;
use crate::protocol::{LevelFrame, LevelTarget};
use crate::telemetry::{PartialUpdate, UpdateCoalescer};

/// Точка записи для активной стратегии: конвертер + коалесцер
///
/// Клонируется в задачи стратегии. После `deactivate` ничего не
/// пропускает дальше.
#[derive(Clone)]
pub struct IngestSink {
    coalescer: Arc<UpdateCoalescer>,
    converter: Arc<LevelConverter>,
    active: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
}

impl IngestSink {
    pub fn new(coalescer: Arc<UpdateCoalescer>, converter: Arc<LevelConverter>) -> Self {
        Self {
            coalescer,
            converter,
            active: Arc::new(AtomicBool::new(true)),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Перевести кадр в линейные единицы и передать в коалесцер
    pub fn forward_frame(&self, frame: &LevelFrame) {
        if !self.is_active() {
            return;
        }

        let levels = self.converter.frame_levels(frame);
        let update = match frame.target {
            LevelTarget::Channel(id) => PartialUpdate::channel(id, levels),
            LevelTarget::Master => PartialUpdate::master(levels),
        };

        self.frames.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target_meter = %frame.target, lag_us = frame.age_micros(), "Level frame");
        self.coalescer.push(update);
    }

    /// Передать уже собранное обновление (результат опроса)
    pub fn forward_update(&self, update: PartialUpdate) {
        if !self.is_active() {
            return;
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.coalescer.push(update);
    }

    pub fn converter(&self) -> &LevelConverter {
        &self.converter
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Прекратить пропуск обновлений (вызывается при остановке стратегии)
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Сколько кадров/обновлений прошло через эту точку
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
