//! The OHLCV bar type common to both bar-building paths.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One symbol's OHLCV bar at a given bar-time on a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: SmolStr,
    pub date: NaiveDate,
    pub bar_time: NaiveTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub amount: f64,
    /// `amount / volume`, `None` when `volume == 0`.
    pub vwap: Option<f64>,
    /// Bar-over-previous-bar return, `close / pcls - 1`. `None` when there
    /// is no previous close or it is non-positive.
    pub ret: Option<f64>,
}

impl Bar {
    pub fn vwap_of(amount: f64, volume: i64) -> Option<f64> {
        if volume > 0 {
            Some(amount / volume as f64)
        } else {
            None
        }
    }

    pub fn ret_of(close: f64, pcls: Option<f64>) -> Option<f64> {
        match pcls {
            Some(p) if p > 0.0 => Some(close / p - 1.0),
            _ => None,
        }
    }

    /// `high >= max(open, close, low)` and `low <= min(open, close, high)`
    /// whenever the bar actually traded; a zero-volume bar carries
    /// open==high==low==close by construction and trivially satisfies both.
    pub fn invariants_hold(&self) -> bool {
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }
}
