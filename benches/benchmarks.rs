use chrono::{NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use surge_factors::bars::builder::build_bars_ops1;
use surge_factors::data::tick::TradeTick;
use surge_factors::surge::detector::detect_m10_rolling;
use surge_factors::time::BarFreq;

fn synthetic_trades(n: usize) -> Vec<TradeTick> {
    let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    let base = NaiveDateTime::new(date, chrono::NaiveTime::from_hms_opt(9, 31, 0).unwrap());
    (0..n)
        .map(|i| TradeTick {
            symbol: "600519.SH".into(),
            xts: base + chrono::Duration::seconds((i as i64) * 3 % (4 * 3600)),
            price: 10.0 + (i % 7) as f64 * 0.01,
            volume: 100 + (i % 13) as i64,
            amount: 1000.0 + (i % 13) as f64,
            flag: 0,
        })
        .collect()
}

fn bench_bar_building(c: &mut Criterion) {
    let ticks = synthetic_trades(20_000);
    let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    c.bench_function("build_bars_ops1_20k_ticks", |b| {
        b.iter(|| build_bars_ops1(black_box(&ticks), date, BarFreq::M1))
    });
}

fn bench_surge_detection(c: &mut Criterion) {
    let ticks = synthetic_trades(20_000);
    let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    let bars = build_bars_ops1(&ticks, date, BarFreq::M10);
    c.bench_function("detect_m10_rolling_one_symbol", |b| {
        b.iter(|| detect_m10_rolling(black_box(bars.clone()), 20, 2.0))
    });
}

criterion_group!(benches, bench_bar_building, bench_surge_detection);
criterion_main!(benches);
