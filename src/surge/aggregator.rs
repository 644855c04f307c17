//! Factor configuration and the surge_ret / surge_vol aggregations that
//! turn a stream of classified [`SurgeBar`]s into one factor observation
//! per `(symbol, date[, bar_time])`.

use crate::error::{Result, SurgeError};
use crate::surge::detector::SurgeMode;
use crate::surge::surge_bar::SurgeBar;
use crate::time::{BarFreq, TradingTimeSlice};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Which price series a factor is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    Close,
    Vwap,
}

impl PriceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceType::Close => "close",
            PriceType::Vwap => "vwap",
        }
    }
}

/// Which of the two aggregations a config asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorType {
    SurgeRet,
    SurgeVol,
}

/// Scale of the emitted factor row: one scalar per `(symbol, date)`, or a
/// 24-point intraday series keyed by the M10 grid. Distinct from
/// [`BarFreq`], which is the *input* bar-building resolution — an EOD
/// factor can be built from 1m/5m/10m bars just as an M10 factor can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFreq {
    Eod,
    M10,
}

impl OutputFreq {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFreq::Eod => "eod",
            OutputFreq::M10 => "m10",
        }
    }
}

/// A fully-specified factor: which bars to build, which surge baseline to
/// classify them against, and which aggregation to run over the result.
///
/// `neutralize` and `is_abs` are opt-in, additive fields absent from the
/// default factor-name contract: turning either on changes the values
/// `factor_engine::run_one_factor` emits (cross-sectional mean subtraction,
/// then absolute value, applied in that order after this config's own
/// per-symbol aggregation) but never changes [`FactorConfig::factor_name`]
/// unless the caller also overrides `name_override`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorConfig {
    pub bar_freq: BarFreq,
    pub output_freq: OutputFreq,
    pub factor_type: FactorType,
    pub trading_time: TradingTimeSlice,
    pub threshold: f64,
    pub m10_method: Option<M10Method>,
    pub lookback_days: Option<u32>,
    pub lookback_bars: Option<usize>,
    pub surge_window: Option<usize>,
    pub intraday_stat: IntradayStat,
    /// Column `surge_vol` computes volatility over. `None` means `bar_ret`
    /// (the default); `Some(price_type)` means that raw price column's own
    /// values, not returns derived from it.
    pub price_type: Option<PriceType>,
    #[serde(default)]
    pub neutralize: bool,
    #[serde(default)]
    pub is_abs: bool,
    pub name_override: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum M10Method {
    SameTime,
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntradayStat {
    Mean,
    Max,
    Min,
}

impl IntradayStat {
    pub fn as_str(self) -> &'static str {
        match self {
            IntradayStat::Mean => "mean",
            IntradayStat::Max => "max",
            IntradayStat::Min => "min",
        }
    }

    /// Reduces a non-empty slice of per-period values to the single scalar
    /// this stat names. Panics on an empty slice; every call site filters
    /// to `is_surge`/windowed values first and surfaces
    /// [`SurgeError::EmptySurgeSet`] before reducing an empty set.
    pub fn reduce(self, values: &[f64]) -> f64 {
        match self {
            IntradayStat::Mean => values.iter().sum::<f64>() / values.len() as f64,
            IntradayStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            IntradayStat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

impl FactorConfig {
    /// Validates the combination this config describes, rejecting an
    /// inconsistent M10-output `surge_vol` request rather than silently
    /// coercing it to `surge_ret` (an explicit divergence documented as an
    /// Open Question resolution: consistency with this engine's other
    /// construction-time validation outweighs matching a legacy warn-and-
    /// coerce behavior).
    pub fn validate(&self) -> Result<()> {
        let is_m10 = matches!(self.output_freq, OutputFreq::M10);
        // surge_vol is EOD-only (spec.md §4.E): an M10 surge_vol request is
        // rejected outright rather than silently downgraded to surge_ret.
        if is_m10 && self.factor_type == FactorType::SurgeVol {
            return Err(SurgeError::ConfigError(
                "surge_vol is EOD-only; M10 output requires factor_type=surge_ret".into(),
            ));
        }
        if is_m10 && self.m10_method.is_none() {
            return Err(SurgeError::ConfigError(
                "M10 output requires an m10_method (same_time or rolling)".into(),
            ));
        }
        if matches!(self.m10_method, Some(M10Method::SameTime)) && self.lookback_days.is_none() {
            return Err(SurgeError::ConfigError(
                "m10_method=same_time requires lookback_days".into(),
            ));
        }
        if matches!(self.m10_method, Some(M10Method::Rolling)) && self.lookback_bars.is_none() {
            return Err(SurgeError::ConfigError(
                "m10_method=rolling requires lookback_bars".into(),
            ));
        }
        if self.factor_type == FactorType::SurgeVol && self.surge_window.is_none() {
            return Err(SurgeError::ConfigError(
                "surge_vol requires surge_window".into(),
            ));
        }
        Ok(())
    }

    /// Derives the [`SurgeMode`] the detector must run, directly from this
    /// config's own `output_freq`/`m10_method`/`lookback_*` fields rather
    /// than from a second, independently-specified field — the factor name
    /// and the detector baseline must always agree on which mode a config
    /// describes, so there is exactly one place that decides. Call
    /// [`FactorConfig::validate`] first; this assumes the combination is
    /// already internally consistent and panics on `debug_assert` builds
    /// if a required companion field is missing.
    pub fn surge_mode(&self) -> SurgeMode {
        match (self.output_freq, self.m10_method) {
            (OutputFreq::Eod, _) => SurgeMode::Eod,
            (OutputFreq::M10, Some(M10Method::SameTime)) => SurgeMode::M10SameTime {
                lookback_days: self.lookback_days.unwrap_or_default(),
            },
            (OutputFreq::M10, Some(M10Method::Rolling)) => SurgeMode::M10Rolling {
                lookback_bars: self.lookback_bars.unwrap_or_default(),
            },
            (OutputFreq::M10, None) => {
                debug_assert!(false, "M10 output without m10_method should be rejected by validate()");
                SurgeMode::M10Rolling {
                    lookback_bars: self.lookback_bars.unwrap_or_default(),
                }
            }
        }
    }

    /// The `mode_params` token of the factor name: the trading-time slice
    /// for an EOD baseline, or `sametime_d{H}`/`rolling_k{k}` for an M10
    /// baseline (spec.md §4.E "Factor naming").
    fn mode_params(&self) -> String {
        match (self.output_freq, self.m10_method) {
            (OutputFreq::M10, Some(M10Method::SameTime)) => {
                format!("sametime_d{}", self.lookback_days.unwrap_or_default())
            }
            (OutputFreq::M10, Some(M10Method::Rolling)) => {
                format!("rolling_k{}", self.lookback_bars.unwrap_or_default())
            }
            _ => self.trading_time.as_str().to_string(),
        }
    }

    /// Deterministic factor name:
    /// `surge_{ret|vol}_{barfreq}_{outfreq}_{mode_params}_t{threshold}_{stat}`,
    /// with `_w{surge_window}` and an optional `_{price_type}` suffix for
    /// `surge_vol`. `neutralize`/`is_abs` never perturb this; a caller that
    /// turns either on and needs a distinguishable name sets `name_override`.
    pub fn factor_name(&self) -> String {
        if let Some(name) = &self.name_override {
            return name.clone();
        }
        let kind = match self.factor_type {
            FactorType::SurgeRet => "surge_ret",
            FactorType::SurgeVol => "surge_vol",
        };
        let mut name = format!(
            "{kind}_{}_{}_{}_t{}_{}",
            self.bar_freq.as_str(),
            self.output_freq.as_str(),
            self.mode_params(),
            self.threshold,
            self.intraday_stat.as_str(),
        );
        if self.factor_type == FactorType::SurgeVol {
            name.push_str(&format!("_w{}", self.surge_window.unwrap_or_default()));
            if let Some(price_type) = self.price_type {
                name.push('_');
                name.push_str(price_type.as_str());
            }
        }
        name
    }
}

/// One factor observation: a symbol/date pair, optionally carrying an M10
/// bar-time when the factor is computed at bar granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorObservation {
    pub symbol: SmolStr,
    pub date: chrono::NaiveDate,
    pub bar_time: Option<chrono::NaiveTime>,
    pub value: f64,
}

fn price_of(bar: &SurgeBar, price_type: PriceType) -> f64 {
    match price_type {
        PriceType::Close => bar.bar.close,
        PriceType::Vwap => bar.bar.vwap.unwrap_or(bar.bar.close),
    }
}

/// `surge_ret`: the aggregated return across bars flagged as surges,
/// filtered first and projected second, so an M10-frequency config sees
/// only bars whose own 1m/5m granularity surged, aggregated up to the M10
/// bar-time they project onto.
pub fn aggregate_surge_ret(
    bars: &[SurgeBar],
    config: &FactorConfig,
) -> Result<Vec<(Option<chrono::NaiveTime>, f64)>> {
    let surging: Vec<&SurgeBar> = bars.iter().filter(|b| b.is_surge).collect();
    if surging.is_empty() {
        return Err(SurgeError::EmptySurgeSet(config.factor_name()));
    }

    let mut groups: std::collections::BTreeMap<chrono::NaiveTime, Vec<f64>> =
        std::collections::BTreeMap::new();
    for b in &surging {
        // EOD rows carry the fixed 15:00:00 bar-time (spec.md §8 invariant
        // 6), not an absent one; only M10 output projects onto the grid.
        let key = if matches!(config.output_freq, OutputFreq::M10) {
            crate::time::tau_m10(b.bar.bar_time)
        } else {
            crate::time::CLOSING_AUCTION_START()
        };
        groups.entry(key).or_default().push(b.bar_ret.unwrap_or(0.0));
    }

    // `is_abs` is deliberately not applied here: the original's step order
    // is reduce -> cross-sectional neutralize -> abs, and neutralization
    // needs every symbol's reduced value for the day, which a per-symbol
    // aggregator call never sees. Both `neutralize` and `is_abs` are
    // applied one level up, in `factor_engine::run_one_factor`, after this
    // function's per-symbol results are collected across the whole day.
    let mut out = Vec::with_capacity(groups.len());
    for (key, values) in groups {
        out.push((Some(key), config.intraday_stat.reduce(&values)));
    }
    Ok(out)
}

/// `surge_vol`: standard deviation, within a trailing window of
/// `surge_window` bars ending on a surge bar, of the column `price_type`
/// names or `bar_ret` when `price_type` is `None` (spec.md §4.E;
/// `surge_factor.py:_calculate_period_volatility`). The std is taken over
/// that column's own values directly, not over period-to-period returns
/// derived from it. A surge bar without `surge_window` bars of history
/// behind it (`min_periods`) contributes nothing rather than shrinking the
/// window, matching the original's `rolling_std(..., min_periods=surge_window)`
/// followed by a `period_vol.is_not_null()` filter. `surge_vol` is EOD-only
/// (rejected for M10 output at construction, see [`FactorConfig::validate`]),
/// so every window's volatility is reduced by `intraday_stat` into one
/// `(symbol, date)` scalar rather than left as one row per window.
pub fn aggregate_surge_vol(
    bars: &[SurgeBar],
    config: &FactorConfig,
) -> Result<Vec<(Option<chrono::NaiveTime>, f64)>> {
    let window = config
        .surge_window
        .ok_or_else(|| SurgeError::ConfigError("surge_vol requires surge_window".into()))?;

    let values: Vec<f64> = bars
        .iter()
        .map(|b| match config.price_type {
            Some(price_type) => price_of(b, price_type),
            None => b.bar_ret.unwrap_or(0.0),
        })
        .collect();

    let mut period_stds = Vec::new();
    for (i, b) in bars.iter().enumerate() {
        if !b.is_surge {
            continue;
        }
        if i + 1 < window {
            continue;
        }
        let lo = i + 1 - window;
        let slice = &values[lo..=i];
        if slice.len() < 2 {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / slice.len() as f64;
        let variance =
            slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (slice.len() - 1) as f64;
        period_stds.push(variance.sqrt());
    }
    if period_stds.is_empty() {
        return Err(SurgeError::EmptySurgeSet(config.factor_name()));
    }
    Ok(vec![(
        Some(crate::time::CLOSING_AUCTION_START()),
        config.intraday_stat.reduce(&period_stds),
    )])
}
