//! Per-settlement-day task orchestration: one task loads ticks once,
//! builds whichever bar frequencies its factors need, runs every factor,
//! and reports its own failure independently of every other date's task.

use crate::bars::builder::{build_bars_ops1, build_bars_ops2};
use crate::bars::Bar;
use crate::calendar::TradingCalendar;
use crate::data::loader::{load_snaps, load_trades};
use crate::data::store::TickStore;
use crate::error::{Result, SurgeError};
use crate::surge::aggregator::{
    aggregate_surge_ret, aggregate_surge_vol, FactorConfig, FactorObservation, FactorType,
};
use crate::surge::detector::{detect_eod, detect_m10_rolling, detect_m10_same_time, SurgeMode};
use crate::time::{bars_in_slice, BarFreq};
use chrono::NaiveDate;
use hashbrown::HashMap;
use std::collections::HashMap as StdHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Which raw series a [`FactorConfig`] is built from; OPS1 (trades) is the
/// default, OPS2 (snapshots) is selected per-config by the caller assembling
/// the engine's factor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSource {
    Trades,
    Snaps,
}

/// A factor to run, paired with the raw series it is built from. The
/// detector's [`SurgeMode`] is derived from `config` itself
/// ([`FactorConfig::surge_mode`]) rather than specified separately here,
/// so the factor name and the detector baseline can never disagree about
/// which mode a config describes.
pub struct FactorSpec {
    pub config: FactorConfig,
    pub source: BarSource,
}

/// Outcome of running every [`FactorSpec`] for one settlement day.
pub struct SettlementDayResult {
    pub date: NaiveDate,
    pub observations: HashMap<String, Vec<FactorObservation>>,
}

/// A single spec's own history requirement, in trading days before `date`.
fn spec_lookback_days(s: &FactorSpec) -> u32 {
    match s.config.surge_mode() {
        SurgeMode::Eod => 0,
        SurgeMode::M10SameTime { lookback_days } => lookback_days,
        SurgeMode::M10Rolling { lookback_bars } => {
            let bars_per_day = s.config.bar_freq.bars_per_day() as u32;
            (lookback_bars as u32).div_ceil(bars_per_day.max(1)) + 1
        }
    }
}

/// The minimum number of trading days a settlement-day task must look back
/// before `date`, across every configured factor, so the engine can reject
/// a run before doing any per-date work if history is structurally short.
pub fn max_lookback_days(specs: &[FactorSpec]) -> u32 {
    specs.iter().map(spec_lookback_days).max().unwrap_or(0)
}

fn bars_for(
    store: &Arc<dyn TickStore>,
    date: NaiveDate,
    freq: BarFreq,
    source: BarSource,
) -> Result<Vec<Bar>> {
    match source {
        BarSource::Trades => {
            let loaded = load_trades(store, date)?;
            Ok(build_bars_ops1(&loaded.ticks, date, freq))
        }
        BarSource::Snaps => {
            let loaded = load_snaps(store, date)?;
            Ok(build_bars_ops2(&loaded.ticks, date, freq))
        }
    }
}

fn bars_by_symbol(bars: Vec<Bar>) -> StdHashMap<String, Vec<Bar>> {
    let mut by_symbol: StdHashMap<String, Vec<Bar>> = StdHashMap::new();
    for b in bars {
        by_symbol.entry(b.symbol.to_string()).or_default().push(b);
    }
    for v in by_symbol.values_mut() {
        v.sort_by_key(|b| (b.date, b.bar_time));
    }
    by_symbol
}

fn run_one_factor(
    spec: &FactorSpec,
    all_specs: &[FactorSpec],
    store: &Arc<dyn TickStore>,
    calendar: &Arc<dyn TradingCalendar>,
    date: NaiveDate,
    bar_cache: &mut StdHashMap<(BarFreq, BarSource), StdHashMap<String, Vec<Bar>>>,
) -> Result<Vec<FactorObservation>> {
    spec.config.validate()?;

    let key = (spec.config.bar_freq, spec.source);
    if !bar_cache.contains_key(&key) {
        // Size this cache entry to the deepest lookback among every spec
        // sharing this (bar_freq, source) key, not just this one factor's
        // own need, so the shared frame is built once and satisfies all of
        // them regardless of which factor happens to populate the cache
        // first (spec §4.F).
        let extra_days = all_specs
            .iter()
            .filter(|s| (s.config.bar_freq, s.source) == key)
            .map(spec_lookback_days)
            .max()
            .unwrap_or(0);
        let lo = if extra_days == 0 {
            date
        } else {
            calendar.prev_biz_day(date, extra_days)?
        };
        let mut all_bars = Vec::new();
        for d in calendar.biz_days_in_range(lo, date) {
            all_bars.extend(bars_for(store, d, spec.config.bar_freq, spec.source)?);
        }
        bar_cache.insert(key, bars_by_symbol(all_bars));
    }
    let by_symbol = bar_cache.get(&key).expect("just inserted");

    let mut observations = Vec::new();
    for (symbol, history) in by_symbol {
        let today: Vec<Bar> = history.iter().filter(|b| b.date == date).cloned().collect();
        if today.is_empty() {
            continue;
        }
        let allowed_times = bars_in_slice(spec.config.bar_freq, spec.config.trading_time);
        let today: Vec<Bar> = today
            .into_iter()
            .filter(|b| allowed_times.contains(&b.bar_time))
            .collect();

        let classified = match spec.config.surge_mode() {
            SurgeMode::Eod => detect_eod(today, spec.config.threshold),
            SurgeMode::M10SameTime { lookback_days } => {
                let mut history_by_bar_time: StdHashMap<chrono::NaiveTime, Vec<i64>> =
                    StdHashMap::new();
                let prior_days: Vec<NaiveDate> = calendar
                    .biz_days_in_range(calendar.prev_biz_day(date, lookback_days)?, date)
                    .into_iter()
                    .filter(|d| *d != date)
                    .collect();
                for b in history.iter().filter(|b| prior_days.contains(&b.date)) {
                    history_by_bar_time.entry(b.bar_time).or_default().push(b.volume);
                }
                detect_m10_same_time(today, &history_by_bar_time, lookback_days, spec.config.threshold)?
            }
            SurgeMode::M10Rolling { lookback_bars } => {
                detect_m10_rolling(history.clone(), lookback_bars, spec.config.threshold)
                    .into_iter()
                    .filter(|sb| sb.bar.date == date)
                    .collect()
            }
        };

        let per_key = match spec.config.factor_type {
            FactorType::SurgeRet => aggregate_surge_ret(&classified, &spec.config)?,
            FactorType::SurgeVol => aggregate_surge_vol(&classified, &spec.config)?,
        };
        for (bar_time, value) in per_key {
            observations.push(FactorObservation {
                symbol: symbol.as_str().into(),
                date,
                bar_time,
                value,
            });
        }
    }
    // Step order matches the original: reduce (already done per-symbol
    // above) -> cross-sectional neutralize -> abs.
    if spec.config.neutralize {
        neutralize_cross_sectionally(&mut observations);
    }
    if spec.config.is_abs {
        for obs in &mut observations {
            obs.value = obs.value.abs();
        }
    }
    Ok(observations)
}

/// Subtracts the cross-sectional mean of `value`, grouped by `bar_time`
/// (the non-symbol key of the aggregation), from every observation in
/// place. A single-symbol group neutralizes to exactly zero, which is
/// correct — there is no cross-section to compare against.
fn neutralize_cross_sectionally(observations: &mut [FactorObservation]) {
    let mut sums: StdHashMap<Option<chrono::NaiveTime>, (f64, usize)> = StdHashMap::new();
    for obs in observations.iter() {
        let entry = sums.entry(obs.bar_time).or_insert((0.0, 0));
        entry.0 += obs.value;
        entry.1 += 1;
    }
    let means: StdHashMap<Option<chrono::NaiveTime>, f64> = sums
        .into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect();
    for obs in observations.iter_mut() {
        if let Some(mean) = means.get(&obs.bar_time) {
            obs.value -= mean;
        }
    }
}

/// Runs every configured factor for one settlement day. Bars are built
/// once per `(bar_freq, source)` pair and shared across every factor that
/// needs that pair; a factor whose own history lookback can't be
/// satisfied fails only that factor's entry, not the whole day.
pub fn run_settlement_day(
    specs: &[FactorSpec],
    store: &Arc<dyn TickStore>,
    calendar: &Arc<dyn TradingCalendar>,
    date: NaiveDate,
) -> SettlementDayResult {
    let mut bar_cache: StdHashMap<(BarFreq, BarSource), StdHashMap<String, Vec<Bar>>> =
        StdHashMap::new();
    let mut observations = HashMap::new();
    for spec in specs {
        let name = spec.config.factor_name();
        match run_one_factor(spec, specs, store, calendar, date, &mut bar_cache) {
            Ok(obs) => {
                observations.insert(name, obs);
            }
            Err(e) => {
                log::warn!("factor {name} failed for {date}: {e}");
            }
        }
    }
    SettlementDayResult { date, observations }
}

/// Runs every settlement day in `dates` in parallel via a `rayon` pool
/// sized to `n_workers`, isolating a panicking task so one bad date can't
/// bring down the rest of the run.
pub fn run_all(
    specs: &[FactorSpec],
    store: Arc<dyn TickStore>,
    calendar: Arc<dyn TradingCalendar>,
    dates: &[NaiveDate],
    n_workers: usize,
) -> Result<Vec<SettlementDayResult>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers.max(1))
        .build()
        .map_err(|e| SurgeError::ConfigError(format!("failed to build worker pool: {e}")))?;

    let results: Vec<Option<SettlementDayResult>> = pool.install(|| {
        use rayon::prelude::*;
        dates
            .par_iter()
            .map(|date| {
                let store = store.clone();
                let calendar = calendar.clone();
                match catch_unwind(AssertUnwindSafe(|| {
                    run_settlement_day(specs, &store, &calendar, *date)
                })) {
                    Ok(result) => Some(result),
                    Err(_) => {
                        log::error!("settlement day task panicked for {date}");
                        None
                    }
                }
            })
            .collect()
    });

    let completed: Vec<SettlementDayResult> = results.into_iter().flatten().collect();
    if completed.is_empty() && !dates.is_empty() {
        return Err(SurgeError::ConfigError(
            "every settlement-day task failed".into(),
        ));
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(symbol: &str, bar_time: Option<chrono::NaiveTime>, value: f64) -> FactorObservation {
        FactorObservation {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            bar_time,
            value,
        }
    }

    #[test]
    fn neutralize_subtracts_cross_sectional_mean_per_bar_time() {
        let mut observations = vec![
            obs("600519.SH", None, 0.04),
            obs("000001.SZ", None, 0.02),
            obs("300750.SZ", None, 0.0),
        ];
        neutralize_cross_sectionally(&mut observations);
        let total: f64 = observations.iter().map(|o| o.value).sum();
        assert!(total.abs() < 1e-9);
        assert!((observations[0].value - 0.02).abs() < 1e-9);
    }

    #[test]
    fn neutralize_groups_are_independent_across_bar_times() {
        let t1 = chrono::NaiveTime::from_hms_opt(9, 40, 0);
        let t2 = chrono::NaiveTime::from_hms_opt(9, 50, 0);
        let mut observations = vec![obs("600519.SH", t1, 0.1), obs("000001.SZ", t2, 0.3)];
        neutralize_cross_sectionally(&mut observations);
        // Each bar_time has exactly one symbol, so every value neutralizes to zero.
        assert!(observations.iter().all(|o| o.value.abs() < 1e-9));
    }

    #[test]
    fn max_lookback_days_takes_the_max_across_modes() {
        let specs = vec![
            FactorSpec {
                config: crate::surge::aggregator::FactorConfig {
                    bar_freq: BarFreq::M10,
                    output_freq: crate::surge::aggregator::OutputFreq::M10,
                    factor_type: crate::surge::aggregator::FactorType::SurgeRet,
                    trading_time: crate::time::TradingTimeSlice::AllDay,
                    threshold: 2.0,
                    m10_method: Some(crate::surge::aggregator::M10Method::Rolling),
                    lookback_days: None,
                    lookback_bars: Some(48),
                    surge_window: None,
                    intraday_stat: crate::surge::aggregator::IntradayStat::Mean,
                    price_type: None,
                    neutralize: false,
                    is_abs: false,
                    name_override: None,
                },
                source: BarSource::Trades,
            },
            FactorSpec {
                config: crate::surge::aggregator::FactorConfig {
                    bar_freq: BarFreq::M10,
                    output_freq: crate::surge::aggregator::OutputFreq::Eod,
                    factor_type: crate::surge::aggregator::FactorType::SurgeRet,
                    trading_time: crate::time::TradingTimeSlice::AllDay,
                    threshold: 2.0,
                    m10_method: None,
                    lookback_days: None,
                    lookback_bars: None,
                    surge_window: None,
                    intraday_stat: crate::surge::aggregator::IntradayStat::Mean,
                    price_type: None,
                    neutralize: false,
                    is_abs: false,
                    name_override: None,
                },
                source: BarSource::Trades,
            },
        ];
        // 48 lookback_bars / 24 bars-per-day (M10) = 2, +1 = 3.
        assert_eq!(max_lookback_days(&specs), 3);
    }

    struct MemStore {
        trades: StdHashMap<(NaiveDate, crate::data::tick::Exchange), Vec<crate::data::tick::TradeTick>>,
    }

    impl TickStore for MemStore {
        fn scan_trades(
            &self,
            date: NaiveDate,
            exchange: crate::data::tick::Exchange,
        ) -> Result<Vec<crate::data::tick::TradeTick>> {
            Ok(self.trades.get(&(date, exchange)).cloned().unwrap_or_default())
        }
        fn scan_quotes(
            &self,
            _date: NaiveDate,
            _exchange: crate::data::tick::Exchange,
        ) -> Result<Vec<crate::data::tick::QuoteTick>> {
            Ok(Vec::new())
        }
        fn scan_snaps(
            &self,
            _date: NaiveDate,
            _exchange: crate::data::tick::Exchange,
        ) -> Result<Vec<crate::data::tick::SnapTick>> {
            Ok(Vec::new())
        }
        fn has_partition(
            &self,
            date: NaiveDate,
            exchange: crate::data::tick::Exchange,
            kind: crate::data::tick::TickKind,
        ) -> bool {
            kind == crate::data::tick::TickKind::Trade && self.trades.contains_key(&(date, exchange))
        }
    }

    fn flat_day(date: NaiveDate) -> Vec<crate::data::tick::TradeTick> {
        let mut ticks = Vec::new();
        for minute in 31..=90u32 {
            let (h, m) = (9 + minute / 60, minute % 60);
            ticks.push(crate::data::tick::TradeTick {
                symbol: "600519".into(),
                xts: chrono::NaiveDateTime::new(date, chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap()),
                price: 10.0,
                volume: 100,
                amount: 1000.0,
                flag: 0,
            });
        }
        ticks
    }

    #[test]
    fn bar_cache_is_sized_for_every_spec_sharing_its_key_not_just_the_populating_one() {
        use crate::calendar::FixedCalendar;
        use crate::data::tick::Exchange;

        let dates: Vec<NaiveDate> = (5..=8)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let mut trades = StdHashMap::new();
        for &d in &dates {
            trades.insert((d, Exchange::SH), flat_day(d));
            trades.insert((d, Exchange::SZ), Vec::new());
        }
        let store: Arc<dyn TickStore> = Arc::new(MemStore { trades });
        let calendar: Arc<dyn TradingCalendar> = Arc::new(FixedCalendar::new(2023, 2024));
        let today = *dates.last().unwrap();

        // Lists an EOD factor (own lookback 0) first, sharing its
        // (bar_freq=M10, source=Trades) cache key with an M10-same-time
        // factor that needs 3 days of history the EOD factor doesn't.
        let eod_spec = FactorSpec {
            config: crate::surge::aggregator::FactorConfig {
                bar_freq: BarFreq::M10,
                output_freq: crate::surge::aggregator::OutputFreq::Eod,
                factor_type: crate::surge::aggregator::FactorType::SurgeRet,
                trading_time: crate::time::TradingTimeSlice::AllDay,
                threshold: 2.0,
                m10_method: None,
                lookback_days: None,
                lookback_bars: None,
                surge_window: None,
                intraday_stat: crate::surge::aggregator::IntradayStat::Mean,
                price_type: None,
                neutralize: false,
                is_abs: false,
                name_override: None,
            },
            source: BarSource::Trades,
        };
        let m10_spec = FactorSpec {
            config: crate::surge::aggregator::FactorConfig {
                bar_freq: BarFreq::M10,
                output_freq: crate::surge::aggregator::OutputFreq::M10,
                factor_type: crate::surge::aggregator::FactorType::SurgeRet,
                trading_time: crate::time::TradingTimeSlice::AllDay,
                threshold: 2.0,
                m10_method: Some(crate::surge::aggregator::M10Method::SameTime),
                lookback_days: Some(3),
                lookback_bars: None,
                surge_window: None,
                intraday_stat: crate::surge::aggregator::IntradayStat::Mean,
                price_type: None,
                neutralize: false,
                is_abs: false,
                name_override: None,
            },
            source: BarSource::Trades,
        };

        let specs = vec![eod_spec, m10_spec];
        let mut bar_cache = StdHashMap::new();
        // Populate the shared cache entry via the EOD factor first — the
        // bug this guards against sized that entry to the EOD factor's own
        // (zero) lookback, starving the M10-same-time factor that runs next.
        let _ = run_one_factor(&specs[0], &specs, &store, &calendar, today, &mut bar_cache);
        let m10_result = run_one_factor(&specs[1], &specs, &store, &calendar, today, &mut bar_cache);
        assert!(
            !matches!(m10_result, Err(SurgeError::InsufficientHistory(_))),
            "expected the shared cache to already carry 3 days of history, got {:?}",
            m10_result.err()
        );
    }
}
