use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use vu_telemetry::config::MeterConfig;
use vu_telemetry::levels::LevelConverter;
use vu_telemetry::meter::{MeterBank, MeterRenderer};
use vu_telemetry::protocol::LevelFrame;
use vu_telemetry::telemetry::{ChannelLevels, PartialUpdate, TelemetryStore};

fn bench_renderer(c: &mut Criterion) {
    let config = Arc::new(MeterConfig::default());

    c.bench_function("render_changing_levels", |b| {
        let mut renderer = MeterRenderer::new(config.clone());
        let mut level = 0.0f64;
        b.iter(|| {
            level = (level + 0.013) % 1.0;
            black_box(renderer.render(black_box(level), black_box(level * 0.6)))
        })
    });

    c.bench_function("render_jitter_reuse", |b| {
        let mut renderer = MeterRenderer::new(config.clone());
        renderer.render(0.5, 0.3);
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let jitter = if toggle { 0.0002 } else { 0.0 };
            black_box(renderer.render(black_box(0.5 + jitter), black_box(0.3)))
        })
    });
}

fn bench_bank(c: &mut Criterion) {
    let store = TelemetryStore::new();
    let mut update = PartialUpdate::default();
    for id in 0..32 {
        let level = id as f64 / 32.0;
        update.merge(PartialUpdate::channel(id, ChannelLevels::new(level, level * 0.5, level, level * 0.5)));
    }
    store.batch_update(update);
    let snapshot = store.snapshot();

    c.bench_function("bank_render_32_channels", |b| {
        b.iter(|| {
            let mut bank = MeterBank::new(MeterConfig::default());
            black_box(bank.render(&snapshot))
        })
    });
}

fn bench_converter(c: &mut Criterion) {
    let converter = LevelConverter::new();
    let frame = LevelFrame::channel(1, -12.0, -18.0, -10.0, -16.0);

    c.bench_function("convert_frame_cached", |b| {
        b.iter(|| black_box(converter.frame_levels(black_box(&frame))))
    });
}

criterion_group!(benches, bench_renderer, bench_bank, bench_converter);
criterion_main!(benches);
