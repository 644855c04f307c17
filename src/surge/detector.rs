//! Volume-surge detection: three interchangeable baseline schemes feeding
//! the same `mean + threshold * std` classifier.

use crate::bars::Bar;
use crate::bars::builder::bar_ret;
use crate::error::{Result, SurgeError};
use crate::surge::surge_bar::SurgeBar;
use chrono::NaiveTime;
use std::collections::{HashMap, VecDeque};

/// Which baseline a [`crate::surge::aggregator::FactorConfig`] asks the
/// detector to compute against.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SurgeMode {
    /// Mean/std across a named intraday slice of the same trading day.
    Eod,
    /// Mean/std across the same bar-time on the `H` preceding business
    /// days (M10 frequency only).
    M10SameTime { lookback_days: u32 },
    /// Rolling mean/std across the preceding `k` bars of the same symbol,
    /// shifted by one bar so the current bar never contributes to its own
    /// baseline (M10 frequency only).
    M10Rolling { lookback_bars: usize },
}

fn mean_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let n = values.len();
    if n < 2 {
        return (None, None);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (Some(mean), Some(variance.sqrt()))
}

/// EOD baseline: mean/std of volume across every bar in `bars` (already
/// filtered by the caller to one symbol, one date, one named intraday
/// slice), broadcast back onto each of those bars.
pub fn detect_eod(bars: Vec<Bar>, threshold: f64) -> Vec<SurgeBar> {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    let (mean, std) = mean_std(&volumes);
    bars.into_iter()
        .map(|bar| {
            let ret = bar_ret(&bar);
            SurgeBar::classify(bar, ret, mean, std, threshold)
        })
        .collect()
}

/// M10-same-time baseline: `current_day_bars` is one symbol's M10 bars for
/// the settlement day; `history_by_bar_time` maps each bar-time to the
/// volumes observed at that same bar-time on the `lookback_days` preceding
/// business days. Any bar-time with fewer than `lookback_days` historical
/// observations fails the whole task, matching the "skip settlement day
/// when history is short" rule for this mode.
pub fn detect_m10_same_time(
    current_day_bars: Vec<Bar>,
    history_by_bar_time: &HashMap<NaiveTime, Vec<i64>>,
    lookback_days: u32,
    threshold: f64,
) -> Result<Vec<SurgeBar>> {
    let mut out = Vec::with_capacity(current_day_bars.len());
    for bar in current_day_bars {
        let history = history_by_bar_time.get(&bar.bar_time);
        let count = history.map(|h| h.len()).unwrap_or(0);
        if count < lookback_days as usize {
            return Err(SurgeError::InsufficientHistory(format!(
                "bar-time {} has {count} prior observations, need {lookback_days}",
                bar.bar_time
            )));
        }
        let volumes: Vec<f64> = history.unwrap().iter().map(|v| *v as f64).collect();
        let (mean, std) = mean_std(&volumes);
        let ret = bar_ret(&bar);
        out.push(SurgeBar::classify(bar, ret, mean, std, threshold));
    }
    Ok(out)
}

/// M10-rolling baseline: `bars` is one symbol's M10 bars across enough
/// history to cover `lookback_bars`, sorted ascending by `(date, bar_time)`.
/// Bars without `lookback_bars` prior observations get no baseline and
/// never classify as a surge, rather than failing the task.
pub fn detect_m10_rolling(bars: Vec<Bar>, lookback_bars: usize, threshold: f64) -> Vec<SurgeBar> {
    let mut window: VecDeque<f64> = VecDeque::with_capacity(lookback_bars);
    let mut out = Vec::with_capacity(bars.len());
    for bar in bars {
        let (mean, std) = if window.len() == lookback_bars {
            let values: Vec<f64> = window.iter().copied().collect();
            mean_std(&values)
        } else {
            (None, None)
        };
        let ret = bar_ret(&bar);
        let volume = bar.volume as f64;
        out.push(SurgeBar::classify(bar, ret, mean, std, threshold));
        if window.len() == lookback_bars {
            window.pop_front();
        }
        window.push_back(volume);
    }
    out
}
