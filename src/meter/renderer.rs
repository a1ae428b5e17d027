//! Отрисовка одного индикатора в сегменты
//!
//! Линейные peak/RMS превращаются в N дискретных сегментов с цветовыми
//! зонами и маркером удержания пика. Рендерер хранит только результат
//! последней отрисовки: если уровни изменились меньше порога, возвращается
//! тот же `Arc` без пересчёта сегментов.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::MeterConfig;
use crate::levels::{db_to_meter_position, linear_to_db};
use crate::meter::layout::{LayoutKey, MeterLayout, Orientation};

/// Цветовая зона сегмента
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Green,
    Yellow,
    Red,
}

impl Zone {
    /// Зона для нормализованной позиции сегмента
    pub fn for_position(position: f64, yellow_threshold: f64, red_threshold: f64) -> Self {
        if position < yellow_threshold {
            Zone::Green
        } else if position < red_threshold {
            Zone::Yellow
        } else {
            Zone::Red
        }
    }

    pub fn lit_color(&self) -> &'static str {
        match self {
            Zone::Green => "#22c55e",
            Zone::Yellow => "#eab308",
            Zone::Red => "#ef4444",
        }
    }

    /// Приглушённый вариант для подсветки RMS
    pub fn dim_color(&self) -> &'static str {
        match self {
            Zone::Green => "#14532d",
            Zone::Yellow => "#713f12",
            Zone::Red => "#7f1d1d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Off,
    /// Не горит по пику, но в пределах RMS
    Dim,
    Lit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Номер сегмента, начиная с 1 (снизу/слева)
    pub index: usize,
    pub zone: Zone,
    pub state: SegmentState,
}

impl Segment {
    pub fn color(&self) -> Option<&'static str> {
        match self.state {
            SegmentState::Off => None,
            SegmentState::Dim => Some(self.zone.dim_color()),
            SegmentState::Lit => Some(self.zone.lit_color()),
        }
    }
}

/// Маркер удержания пика
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakHold {
    pub position: f64,
    /// Смещение в пикселях вдоль оси индикатора
    pub offset: f64,
}

/// Результат отрисовки одного индикатора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterFrame {
    /// Линейный пик, по которому построен кадр
    pub peak: f64,
    /// Линейный RMS, по которому построен кадр
    pub rms: f64,
    pub peak_position: f64,
    pub rms_position: f64,
    pub lit_segments: usize,
    pub segments: Vec<Segment>,
    pub peak_hold: Option<PeakHold>,
}

/// Линейная амплитуда → позиция на индикаторе
fn level_position(linear: f64, min_db: f64, max_db: f64) -> f64 {
    if !(linear > 0.0) {
        return 0.0;
    }
    db_to_meter_position(linear_to_db(linear), min_db, max_db)
}

/// Рендерер одного индикатора
pub struct MeterRenderer {
    config: Arc<MeterConfig>,
    layout: Arc<MeterLayout>,
    last: Option<Arc<MeterFrame>>,
    renders: u64,
    reuses: u64,
}

impl MeterRenderer {
    pub fn new(config: Arc<MeterConfig>) -> Self {
        let key = LayoutKey {
            orientation: config.orientation,
            dimension: config.dimension,
        };
        let layout = Arc::new(MeterLayout::compute(key, &config));
        Self::with_layout(config, layout)
    }

    /// Рендерер, разделяющий уже посчитанную геометрию
    pub fn with_layout(config: Arc<MeterConfig>, layout: Arc<MeterLayout>) -> Self {
        Self {
            config,
            layout,
            last: None,
            renders: 0,
            reuses: 0,
        }
    }

    /// Отрисовать уровни (линейные, [0, 1])
    pub fn render(&mut self, peak: f64, rms: f64) -> Arc<MeterFrame> {
        let peak = sanitize(peak);
        let rms = sanitize(rms);

        if let Some(last) = &self.last {
            let threshold = self.config.skip_threshold;
            if (peak - last.peak).abs() < threshold && (rms - last.rms).abs() < threshold {
                self.reuses += 1;
                return Arc::clone(last);
            }
        }

        let frame = Arc::new(self.compute(peak, rms));
        self.renders += 1;
        self.last = Some(Arc::clone(&frame));
        frame
    }

    fn compute(&self, peak: f64, rms: f64) -> MeterFrame {
        let config = &self.config;
        let peak_position = level_position(peak, config.min_db, config.max_db);
        let rms_position = level_position(rms, config.min_db, config.max_db);

        let n = config.segments.max(1);
        let mut lit_segments = 0;
        let segments: Vec<Segment> = (1..=n)
            .map(|index| {
                let position = index as f64 / n as f64;
                let zone = Zone::for_position(position, config.yellow_threshold, config.red_threshold);
                let state = if position <= peak_position {
                    lit_segments += 1;
                    SegmentState::Lit
                } else if position <= rms_position {
                    SegmentState::Dim
                } else {
                    SegmentState::Off
                };
                Segment { index, zone, state }
            })
            .collect();

        let peak_hold = (peak_position > config.peak_hold_threshold).then(|| PeakHold {
            position: peak_position,
            offset: self.layout.offset(peak_position),
        });

        MeterFrame {
            peak,
            rms,
            peak_position,
            rms_position,
            lit_segments,
            segments,
            peak_hold,
        }
    }

    /// Сменить ориентацию или размер. Геометрия пересчитывается только
    /// при реальном изменении; кадр сбрасывается, т.к. смещения зависят от размера.
    pub fn resize(&mut self, orientation: Orientation, dimension: u32) {
        let key = LayoutKey { orientation, dimension };
        if self.layout.key == key {
            return;
        }
        self.layout = Arc::new(MeterLayout::compute(key, &self.config));
        self.last = None;
    }

    /// Заменить геометрию на общую (используется банком индикаторов)
    pub fn set_layout(&mut self, layout: Arc<MeterLayout>) {
        if Arc::ptr_eq(&self.layout, &layout) {
            return;
        }
        if self.layout.key != layout.key {
            self.last = None;
        }
        self.layout = layout;
    }

    pub fn layout(&self) -> &Arc<MeterLayout> {
        &self.layout
    }

    pub fn last_frame(&self) -> Option<&Arc<MeterFrame>> {
        self.last.as_ref()
    }

    /// Получал ли индикатор ненулевой уровень в последней отрисовке
    pub fn has_signal(&self) -> bool {
        self.last.as_ref().is_some_and(|f| f.peak > 0.0 || f.rms > 0.0)
    }

    /// Сколько раз сегменты действительно пересчитывались
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Сколько раз был возвращён предыдущий кадр
    pub fn reuse_count(&self) -> u64 {
        self.reuses
    }
}

fn sanitize(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::db_to_linear;

    fn renderer() -> MeterRenderer {
        MeterRenderer::new(Arc::new(MeterConfig::default()))
    }

    #[test]
    fn test_silence_renders_nothing() {
        let mut r = renderer();
        let frame = r.render(0.0, 0.0);
        assert_eq!(frame.lit_segments, 0);
        assert!(frame.segments.iter().all(|s| s.state == SegmentState::Off));
        assert!(frame.peak_hold.is_none());
        assert!(!r.has_signal());
    }

    #[test]
    fn test_full_scale_lights_everything() {
        let mut r = renderer();
        let frame = r.render(1.0, 1.0);
        assert_eq!(frame.lit_segments, 30);
        assert_eq!(frame.segments.last().unwrap().zone, Zone::Red);

        let hold = frame.peak_hold.unwrap();
        assert_eq!(hold.position, 1.0);
        assert_eq!(hold.offset, 0.0);
        assert!(r.has_signal());
    }

    #[test]
    fn test_minus_seven_db() {
        // -7 dB → позиция 53/60 → 26 из 30 сегментов
        let mut r = renderer();
        let frame = r.render(db_to_linear(-7.0), 0.0);
        assert!((frame.peak_position - 53.0 / 60.0).abs() < 1e-9);
        assert_eq!(frame.lit_segments, 26);
        assert!(frame.peak_hold.is_some());
        assert!((frame.peak_hold.unwrap().offset - 200.0 * 7.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_zones() {
        let frame = renderer().render(1.0, 0.0);
        let zone_of = |i: usize| frame.segments[i - 1].zone;
        // 20/30 ≈ 0.667 < 0.70, 21/30 = 0.70, 25/30 ≈ 0.833, 26/30 ≈ 0.867
        assert_eq!(zone_of(20), Zone::Green);
        assert_eq!(zone_of(21), Zone::Yellow);
        assert_eq!(zone_of(25), Zone::Yellow);
        assert_eq!(zone_of(26), Zone::Red);
        assert_eq!(frame.segments[0].color(), Some("#22c55e"));
    }

    #[test]
    fn test_rms_above_peak_is_dimmed() {
        let mut r = renderer();
        let frame = r.render(db_to_linear(-31.0), db_to_linear(-11.0));
        // пик 29/60 → 14 сегментов, RMS 49/60 → приглушены 15..=24
        assert_eq!(frame.lit_segments, 14);
        assert_eq!(frame.segments[14].state, SegmentState::Dim);
        assert_eq!(frame.segments[23].state, SegmentState::Dim);
        assert_eq!(frame.segments[24].state, SegmentState::Off);
        assert_eq!(frame.segments[14].color(), Some(Zone::Green.dim_color()));
        assert!(frame.peak_hold.is_none());
    }

    #[test]
    fn test_small_change_reuses_frame() {
        let mut r = renderer();
        let first = r.render(0.5, 0.3);
        let second = r.render(0.5005, 0.3009);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(r.render_count(), 1);
        assert_eq!(r.reuse_count(), 1);

        let third = r.render(0.502, 0.3);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(r.render_count(), 2);
    }

    #[test]
    fn test_resize_invalidates() {
        let mut r = renderer();
        let before = r.render(1.0, 1.0);
        let layout = Arc::clone(r.layout());

        r.resize(Orientation::Vertical, 200);
        assert!(Arc::ptr_eq(&layout, r.layout()));

        r.resize(Orientation::Horizontal, 100);
        assert!(!Arc::ptr_eq(&layout, r.layout()));
        let after = r.render(1.0, 1.0);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.peak_hold.unwrap().offset, 100.0);
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let mut r = renderer();
        let frame = r.render(f64::NAN, 3.0);
        assert_eq!(frame.peak, 0.0);
        assert_eq!(frame.rms, 1.0);
        assert_eq!(frame.lit_segments, 0);
        assert!(frame.segments.iter().all(|s| s.state == SegmentState::Dim));
    }
}
