//! Преобразование уровней между линейной шкалой, децибелами и позицией на индикаторе
//!
//! Все функции чистые и никогда не возвращают ошибку: входные значения
//! вне допустимого диапазона ограничиваются (clamp), а не отклоняются.
//!
//! ## Единицы
//!
//! - линейная амплитуда: [0, 1]
//! - децибелы: (−∞, 0], всё что ≤ `DB_FLOOR` считается тишиной
//! - позиция индикатора: [0, 1], только для визуального размещения
//!
//! Движок присылает dB, в хранилище лежат линейные значения. Преобразование
//! выполняется ровно один раз, на границе приёма.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{DB_FLOOR, DEFAULT_CONVERTER_CACHE_SIZE};
use crate::protocol::LevelFrame;
use crate::telemetry::ChannelLevels;

/// Линейная амплитуда → dB
///
/// Возвращает `DB_FLOOR` для x ≤ 0 (и для NaN). Результат не опускается
/// ниже `DB_FLOOR`, значения больше 1 ограничиваются до 0 dB.
#[inline]
pub fn linear_to_db(x: f64) -> f64 {
    if !(x > 0.0) {
        return DB_FLOOR;
    }
    (20.0 * x.min(1.0).log10()).max(DB_FLOOR)
}

/// dB → линейная амплитуда
///
/// Возвращает 0 для db ≤ `DB_FLOOR` (и для NaN), 1 для db ≥ 0.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    if !(db > DB_FLOOR) {
        return 0.0;
    }
    10f64.powf(db.min(0.0) / 20.0)
}

/// dB → нормализованная позиция на индикаторе [0, 1]
#[inline]
pub fn db_to_meter_position(db: f64, min_db: f64, max_db: f64) -> f64 {
    let range = max_db - min_db;
    if !(range > 0.0) || db.is_nan() {
        return 0.0;
    }
    ((db - min_db) / range).clamp(0.0, 1.0)
}

/// Нормализованная позиция → dB (обратная к `db_to_meter_position`)
#[inline]
pub fn meter_position_to_db(position: f64, min_db: f64, max_db: f64) -> f64 {
    let range = max_db - min_db;
    if !(range > 0.0) {
        return min_db;
    }
    let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
    min_db + position * range
}

/// Ограниченный по размеру кэш для dB → linear
///
/// Ключ — вход, округлённый до 1e-4 dB. Запись хранит также точные биты
/// входа: попадание засчитывается только при их совпадении, поэтому
/// результат всегда побитово равен вычисленному без кэша. При переполнении
/// вытесняется самая старая запись.
#[derive(Debug)]
struct LevelCache {
    entries: HashMap<i64, (u64, f64)>,
    order: VecDeque<i64>,
    capacity: usize,
}

impl LevelCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    fn key(db: f64) -> i64 {
        (db * 10_000.0).round() as i64
    }

    fn get(&self, db: f64) -> Option<f64> {
        match self.entries.get(&Self::key(db)) {
            Some(&(bits, value)) if bits == db.to_bits() => Some(value),
            _ => None,
        }
    }

    fn insert(&mut self, db: f64, value: f64) {
        let key = Self::key(db);
        if self.entries.insert(key, (db.to_bits(), value)).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Конвертер уровней с необязательной мемоизацией
///
/// Разделяется между стратегиями приёма через `Arc`.
#[derive(Debug)]
pub struct LevelConverter {
    /// `None` если кэширование отключено
    cache: Option<Mutex<LevelCache>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LevelConverter {
    /// Конвертер с кэшем размера по умолчанию
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CONVERTER_CACHE_SIZE)
    }

    /// Конвертер с заданным размером кэша (0 — без кэша)
    pub fn with_cache_size(capacity: usize) -> Self {
        Self {
            cache: (capacity > 0).then(|| Mutex::new(LevelCache::new(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// dB → linear с использованием кэша
    pub fn db_to_linear(&self, db: f64) -> f64 {
        match &self.cache {
            Some(cache) => self.lookup(&mut cache.lock(), db),
            None => db_to_linear(db),
        }
    }

    /// Перевести кадр из dB в линейные уровни канала
    pub fn frame_levels(&self, frame: &LevelFrame) -> ChannelLevels {
        self.tuple_levels(frame.tuple())
    }

    /// Перевести кортеж `(peak_l, rms_l, peak_r, rms_r)` из dB
    ///
    /// Кэш блокируется один раз на весь кортеж.
    pub fn tuple_levels(&self, (peak_left, rms_left, peak_right, rms_right): (f64, f64, f64, f64)) -> ChannelLevels {
        let dbs = [peak_left, rms_left, peak_right, rms_right];
        let [peak_left, rms_left, peak_right, rms_right] = match &self.cache {
            Some(cache) => {
                let mut cache = cache.lock();
                dbs.map(|db| self.lookup(&mut cache, db))
            }
            None => dbs.map(db_to_linear),
        };
        ChannelLevels::new(peak_left, rms_left, peak_right, rms_right)
    }

    fn lookup(&self, cache: &mut LevelCache, db: f64) -> f64 {
        if let Some(value) = cache.get(db) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = db_to_linear(db);
        cache.insert(db, value);
        value
    }

    /// Число попаданий в кэш
    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Число промахов кэша
    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Текущее число записей в кэше
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }
}

impl Default for LevelConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DB_CEILING;
    use proptest::prelude::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_linear_to_db_floor() {
        assert_eq!(linear_to_db(0.0), DB_FLOOR);
        assert_eq!(linear_to_db(-0.5), DB_FLOOR);
        assert_eq!(linear_to_db(f64::NAN), DB_FLOOR);
        assert_eq!(linear_to_db(1e-5), DB_FLOOR);
        assert!((linear_to_db(1.0) - 0.0).abs() < EPS);
        assert!((linear_to_db(2.0) - 0.0).abs() < EPS);
    }

    #[test]
    fn test_db_to_linear_known_values() {
        assert_eq!(db_to_linear(DB_FLOOR), 0.0);
        assert_eq!(db_to_linear(-90.0), 0.0);
        assert_eq!(db_to_linear(f64::NAN), 0.0);
        assert!((db_to_linear(-12.0) - 0.251_188_6).abs() < EPS);
        assert!((db_to_linear(-18.0) - 0.125_892_5).abs() < EPS);
        assert!((db_to_linear(-6.0) - 0.501_187_2).abs() < EPS);
        assert_eq!(db_to_linear(3.0), 1.0);
    }

    #[test]
    fn test_meter_position_clamping() {
        assert_eq!(db_to_meter_position(-80.0, DB_FLOOR, DB_CEILING), 0.0);
        assert_eq!(db_to_meter_position(6.0, DB_FLOOR, DB_CEILING), 1.0);
        assert!((db_to_meter_position(-30.0, DB_FLOOR, DB_CEILING) - 0.5).abs() < EPS);
        assert_eq!(meter_position_to_db(-1.0, DB_FLOOR, DB_CEILING), DB_FLOOR);
        assert_eq!(meter_position_to_db(2.0, DB_FLOOR, DB_CEILING), DB_CEILING);
    }

    #[test]
    fn test_degenerate_range_never_panics() {
        assert_eq!(db_to_meter_position(-10.0, 0.0, 0.0), 0.0);
        assert_eq!(db_to_meter_position(-10.0, 0.0, -60.0), 0.0);
        assert_eq!(meter_position_to_db(0.5, -20.0, -20.0), -20.0);
    }

    #[test]
    fn test_cache_returns_identical_values() {
        let converter = LevelConverter::with_cache_size(16);
        for db in [-12.0, -3.5, -12.0, -12.00001] {
            let cached = converter.db_to_linear(db);
            assert_eq!(cached.to_bits(), db_to_linear(db).to_bits());
        }
        // -12.00001 shares the rounded key of -12.0 but not its bits
        assert_eq!(converter.cache_hits(), 1);
        assert_eq!(converter.cache_misses(), 3);
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let converter = LevelConverter::with_cache_size(4);
        for i in 0..10 {
            converter.db_to_linear(-(i as f64));
        }
        assert_eq!(converter.cache_len(), 4);

        // -9..-6 survive, -0 was evicted
        converter.db_to_linear(-9.0);
        assert_eq!(converter.cache_hits(), 1);
        converter.db_to_linear(0.0);
        assert_eq!(converter.cache_hits(), 1);
    }

    #[test]
    fn test_cache_disabled() {
        let converter = LevelConverter::with_cache_size(0);
        assert!((converter.db_to_linear(-6.0) - 0.501_187_2).abs() < EPS);
        assert_eq!(converter.cache_len(), 0);
        assert_eq!(converter.cache_hits(), 0);
    }

    #[test]
    fn test_tuple_matches_single_values() {
        let converter = LevelConverter::with_cache_size(16);
        let levels = converter.tuple_levels((-6.0, -12.0, -6.0, -90.0));
        assert_eq!(levels.left.peak.to_bits(), db_to_linear(-6.0).to_bits());
        assert_eq!(levels.left.rms.to_bits(), db_to_linear(-12.0).to_bits());
        assert_eq!(levels.right.rms, 0.0);
        // -6.0 repeats inside the same tuple
        assert_eq!(converter.cache_hits(), 1);
        assert_eq!(converter.cache_misses(), 3);

        let uncached = LevelConverter::with_cache_size(0).tuple_levels((-6.0, -12.0, -6.0, -90.0));
        assert_eq!(uncached, levels);
    }

    #[test]
    fn test_channel_scenario() {
        let converter = LevelConverter::new();
        let frame = LevelFrame::channel(3, -12.0, -18.0, -10.0, -16.0);
        let levels = converter.frame_levels(&frame);

        assert!((levels.left.peak - 0.2512).abs() < 1e-4);
        assert!((levels.left.rms - 0.1259).abs() < 1e-4);
        let expected_mono = (levels.left.peak + levels.right.peak) / 2.0;
        assert!((levels.peak() - expected_mono).abs() < EPS);
        assert!((levels.right.peak - db_to_linear(-10.0)).abs() < EPS);
    }

    proptest! {
        #[test]
        fn prop_linear_round_trip(x in 0.0f64..=1.0) {
            let back = db_to_linear(linear_to_db(x));
            if linear_to_db(x) <= DB_FLOOR {
                prop_assert_eq!(back, 0.0);
            } else {
                prop_assert!((back - x).abs() < EPS);
            }
        }

        #[test]
        fn prop_position_round_trip(db in DB_FLOOR..=DB_CEILING) {
            let pos = db_to_meter_position(db, DB_FLOOR, DB_CEILING);
            let back = meter_position_to_db(pos, DB_FLOOR, DB_CEILING);
            prop_assert!((back - db).abs() < EPS);
        }

        #[test]
        fn prop_position_monotonic_and_clamped(a in -200.0f64..50.0, b in -200.0f64..50.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = db_to_meter_position(lo, DB_FLOOR, DB_CEILING);
            let p_hi = db_to_meter_position(hi, DB_FLOOR, DB_CEILING);
            prop_assert!(p_lo <= p_hi);
            prop_assert!((0.0..=1.0).contains(&p_lo));
            prop_assert!((0.0..=1.0).contains(&p_hi));
        }

        #[test]
        fn prop_linear_to_db_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(linear_to_db(lo) <= linear_to_db(hi));
        }
    }
}
