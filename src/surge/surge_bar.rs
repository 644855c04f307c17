//! A bar decorated with its surge-detection baseline and verdict.

use crate::bars::Bar;
use serde::{Deserialize, Serialize};

/// A [`Bar`] plus the baseline volume statistics used to classify it as a
/// surge bar, and the verdict itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeBar {
    pub bar: Bar,
    /// `(close - open) / open`, `None` when `open <= 0`.
    pub bar_ret: Option<f64>,
    pub vol_mean_baseline: Option<f64>,
    pub vol_std_baseline: Option<f64>,
    pub is_surge: bool,
}

impl SurgeBar {
    /// `is_surge = volume > mean + threshold * std`; `false` whenever the
    /// baseline is unavailable or degenerate (std == 0).
    pub fn classify(
        bar: Bar,
        bar_ret: Option<f64>,
        mean: Option<f64>,
        std: Option<f64>,
        threshold: f64,
    ) -> Self {
        let is_surge = match (mean, std) {
            (Some(m), Some(s)) if s > 0.0 => bar.volume as f64 > m + threshold * s,
            _ => false,
        };
        SurgeBar {
            bar,
            bar_ret,
            vol_mean_baseline: mean,
            vol_std_baseline: std,
            is_surge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn sample_bar(volume: i64) -> Bar {
        Bar {
            symbol: "600519.SH".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            bar_time: NaiveTime::from_hms_opt(9, 40, 0).unwrap(),
            open: 10.0,
            high: 10.5,
            low: 9.8,
            close: 10.2,
            volume,
            amount: 10000.0,
            vwap: Some(10.0),
            ret: Some(0.01),
        }
    }

    #[test]
    fn surge_requires_exceeding_mean_plus_k_std() {
        let classified = SurgeBar::classify(sample_bar(150), None, Some(100.0), Some(20.0), 2.0);
        assert!(!classified.is_surge);
        let classified = SurgeBar::classify(sample_bar(145), None, Some(100.0), Some(20.0), 2.0);
        assert!(classified.is_surge);
    }

    #[test]
    fn zero_std_never_surges() {
        let classified = SurgeBar::classify(sample_bar(1_000_000), None, Some(100.0), Some(0.0), 2.0);
        assert!(!classified.is_surge);
    }

    #[test]
    fn missing_baseline_never_surges() {
        let classified = SurgeBar::classify(sample_bar(1_000_000), None, None, None, 2.0);
        assert!(!classified.is_surge);
    }
}
