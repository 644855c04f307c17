//! Trading-session time policy.
//!
//! Every constant table and projection a downstream stage needs to reason
//! about intraday bar grids, lives here and nowhere else: bar builders,
//! surge detectors and the aggregator all go through [`BarFreq`] and the
//! functions below rather than hand-rolling time-of-day arithmetic.

use chrono::NaiveTime;
use std::sync::OnceLock;

/// Bar-building frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BarFreq {
    M1,
    M5,
    M10,
}

impl BarFreq {
    /// Bar width, in minutes.
    pub fn minutes(self) -> i64 {
        match self {
            BarFreq::M1 => 1,
            BarFreq::M5 => 5,
            BarFreq::M10 => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BarFreq::M1 => "m1",
            BarFreq::M5 => "m5",
            BarFreq::M10 => "m10",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "m1" | "1min" => Some(BarFreq::M1),
            "5m" | "m5" | "5min" => Some(BarFreq::M5),
            "10m" | "m10" | "10min" => Some(BarFreq::M10),
            _ => None,
        }
    }

    /// Bars per trading day, used by the M10-rolling lookback calculation.
    pub fn bars_per_day(self) -> usize {
        valid_bar_times(self).len()
    }
}

/// Named intraday slices used by EOD surge detection (`trading_time`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TradingTimeSlice {
    AllDay,
    Morning,
    Afternoon,
    Opening,
    Closing,
    MorningMid,
    AfternoonMid,
}

impl TradingTimeSlice {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "all_day" => Some(TradingTimeSlice::AllDay),
            "morning" => Some(TradingTimeSlice::Morning),
            "afternoon" => Some(TradingTimeSlice::Afternoon),
            "opening" => Some(TradingTimeSlice::Opening),
            "closing" => Some(TradingTimeSlice::Closing),
            "morning_mid" => Some(TradingTimeSlice::MorningMid),
            "afternoon_mid" => Some(TradingTimeSlice::AfternoonMid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradingTimeSlice::AllDay => "all_day",
            TradingTimeSlice::Morning => "morning",
            TradingTimeSlice::Afternoon => "afternoon",
            TradingTimeSlice::Opening => "opening",
            TradingTimeSlice::Closing => "closing",
            TradingTimeSlice::MorningMid => "morning_mid",
            TradingTimeSlice::AfternoonMid => "afternoon_mid",
        }
    }
}

fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).expect("valid session time literal")
}

/// Opening-auction end / morning-session end / afternoon-session start /
/// closing-auction start. Fixed regardless of `BarFreq`.
pub const OPENING_AUCTION_END: fn() -> NaiveTime = || hms(9, 30, 0);
pub const MORNING_END: fn() -> NaiveTime = || hms(11, 30, 0);
pub const AFTERNOON_START: fn() -> NaiveTime = || hms(13, 0, 0);
pub const CLOSING_AUCTION_START: fn() -> NaiveTime = || hms(15, 0, 0);

/// Targets that special-session ticks get rewritten to by the tick loader.
pub const OPENING_AUCTION_TARGET: fn() -> NaiveTime = || hms(9, 30, 1);
pub const NOON_BREAK_TARGET: fn() -> NaiveTime = || hms(11, 29, 59);
pub const CLOSING_AUCTION_TARGET: fn() -> NaiveTime = || hms(14, 59, 59);

/// Trading-hours filter applied by the tick loader: generous right bounds
/// keep late ticks that belong to the 11:30 and 15:00 bars.
pub const TRADING_HOURS_MORNING: fn() -> (NaiveTime, NaiveTime) =
    || (hms(9, 15, 0), hms(11, 32, 0));
pub const TRADING_HOURS_AFTERNOON: fn() -> (NaiveTime, NaiveTime) =
    || (hms(13, 0, 0), hms(15, 15, 0));

fn build_m1_times() -> Vec<NaiveTime> {
    let mut times = Vec::with_capacity(241);
    // Morning: 09:30 through 11:30 inclusive (121 marks). 09:30:00 is kept
    // in the table for bar-time validity even though real trading only
    // populates it on the rare tick landing exactly on the minute; every
    // opening-auction tick is adjusted to 09:30:01 and buckets into 09:31.
    let mut t = hms(9, 30, 0);
    while t <= hms(11, 30, 0) {
        times.push(t);
        t += chrono::Duration::minutes(1);
    }
    // Afternoon: 13:01 through 15:00 inclusive (120 marks).
    let mut t = hms(13, 1, 0);
    while t <= hms(15, 0, 0) {
        times.push(t);
        t += chrono::Duration::minutes(1);
    }
    times
}

fn build_m5_times() -> Vec<NaiveTime> {
    let mut times = Vec::with_capacity(48);
    let mut t = hms(9, 35, 0);
    while t <= hms(11, 30, 0) {
        times.push(t);
        t += chrono::Duration::minutes(5);
    }
    let mut t = hms(13, 5, 0);
    while t <= hms(15, 0, 0) {
        times.push(t);
        t += chrono::Duration::minutes(5);
    }
    times
}

fn build_m10_times() -> Vec<NaiveTime> {
    let mut times = Vec::with_capacity(24);
    let mut t = hms(9, 40, 0);
    while t <= hms(11, 30, 0) {
        times.push(t);
        t += chrono::Duration::minutes(10);
    }
    let mut t = hms(13, 10, 0);
    while t <= hms(15, 0, 0) {
        times.push(t);
        t += chrono::Duration::minutes(10);
    }
    times
}

static M1_TIMES: OnceLock<Vec<NaiveTime>> = OnceLock::new();
static M5_TIMES: OnceLock<Vec<NaiveTime>> = OnceLock::new();
static M10_TIMES: OnceLock<Vec<NaiveTime>> = OnceLock::new();

/// Canonical enumerated list of intraday bar closes for `freq`, ascending,
/// skipping the noon break.
pub fn valid_bar_times(freq: BarFreq) -> &'static [NaiveTime] {
    match freq {
        BarFreq::M1 => M1_TIMES.get_or_init(build_m1_times),
        BarFreq::M5 => M5_TIMES.get_or_init(build_m5_times),
        BarFreq::M10 => M10_TIMES.get_or_init(build_m10_times),
    }
    .as_slice()
}

/// First bar-time of the morning session at `freq` (the bar an
/// opening-auction tick, adjusted to 09:30:01, lands in).
pub fn first_bar_time(freq: BarFreq) -> NaiveTime {
    valid_bar_times(freq)
        .iter()
        .copied()
        .find(|t| *t > OPENING_AUCTION_END())
        .unwrap_or_else(|| valid_bar_times(freq)[0])
}

/// First bar-time of the afternoon session at `freq`.
pub fn afternoon_first_bar_time(freq: BarFreq) -> NaiveTime {
    valid_bar_times(freq)
        .iter()
        .copied()
        .find(|t| *t > MORNING_END())
        .expect("every frequency has at least one afternoon bar")
}

/// Inclusive `[start, end]` bar-time bounds for a named intraday slice.
pub fn trading_time_slice(freq: BarFreq, slice: TradingTimeSlice) -> (NaiveTime, NaiveTime) {
    let morning_start = first_bar_time(freq);
    let afternoon_start = afternoon_first_bar_time(freq);
    let morning_midpoint = hms(10, 0, 0);
    let afternoon_midpoint = hms(14, 30, 0);
    match slice {
        TradingTimeSlice::AllDay => (morning_start, CLOSING_AUCTION_START()),
        TradingTimeSlice::Morning => (morning_start, MORNING_END()),
        TradingTimeSlice::Afternoon => (afternoon_start, CLOSING_AUCTION_START()),
        TradingTimeSlice::Opening => (morning_start, morning_midpoint),
        TradingTimeSlice::Closing => (afternoon_midpoint, CLOSING_AUCTION_START()),
        TradingTimeSlice::MorningMid => (morning_midpoint, MORNING_END()),
        TradingTimeSlice::AfternoonMid => (afternoon_start, afternoon_midpoint),
    }
}

/// Every valid bar-time at `freq` that falls within a named slice.
pub fn bars_in_slice(freq: BarFreq, slice: TradingTimeSlice) -> Vec<NaiveTime> {
    let (start, end) = trading_time_slice(freq, slice);
    valid_bar_times(freq)
        .iter()
        .copied()
        .filter(|t| *t >= start && *t <= end)
        .collect()
}

/// Number of valid bar-times within a named slice, at `freq` — used to size
/// EOD-surge baseline windows.
pub fn bars_per_trading_time(freq: BarFreq, slice: TradingTimeSlice) -> usize {
    bars_in_slice(freq, slice).len()
}

/// Left-open/right-closed bar-time assignment: truncate `t` down to the
/// frequency grid from midnight; if `t` already sits on the grid it keeps
/// its own bar, otherwise it rolls forward into the next one.
pub fn assign_bar_time(t: NaiveTime, freq: BarFreq) -> NaiveTime {
    let width_ms = freq.minutes() * 60_000;
    let ms_since_midnight = (t.num_seconds_from_midnight() as i64) * 1000
        + t.nanosecond() as i64 / 1_000_000;
    let rem = ms_since_midnight % width_ms;
    let floored = ms_since_midnight - rem;
    let bar_ms = if rem == 0 { floored } else { floored + width_ms };
    let bar_ms = bar_ms.rem_euclid(24 * 3_600_000);
    NaiveTime::from_hms_milli_opt(
        (bar_ms / 3_600_000) as u32,
        ((bar_ms / 60_000) % 60) as u32,
        ((bar_ms / 1000) % 60) as u32,
        (bar_ms % 1000) as u32,
    )
    .unwrap_or(t)
}

/// Rewrite a tick time-of-day per the special-session adjustment rules.
/// Preserves the date; only called on times inside the trading-hours
/// filter window.
pub fn adjust_special_time(t: NaiveTime) -> NaiveTime {
    if t < OPENING_AUCTION_END() {
        OPENING_AUCTION_TARGET()
    } else if t > MORNING_END() && t < AFTERNOON_START() {
        NOON_BREAK_TARGET()
    } else if t >= CLOSING_AUCTION_START() {
        CLOSING_AUCTION_TARGET()
    } else {
        t
    }
}

/// Projects any 1m/5m/10m bar-time to the enclosing M10 bar-time: the noon
/// break projects to 11:30, anything past the close projects to 15:00,
/// otherwise the smallest M10 time `>= t`.
pub fn tau_m10(t: NaiveTime) -> NaiveTime {
    if t > MORNING_END() && t < AFTERNOON_START() {
        return MORNING_END();
    }
    if t > CLOSING_AUCTION_START() {
        return CLOSING_AUCTION_START();
    }
    valid_bar_times(BarFreq::M10)
        .iter()
        .copied()
        .find(|m10t| *m10t >= t)
        .unwrap_or_else(CLOSING_AUCTION_START)
}

use chrono::Timelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_bar_time_counts_match_spec() {
        assert_eq!(valid_bar_times(BarFreq::M1).len(), 241);
        assert_eq!(valid_bar_times(BarFreq::M5).len(), 48);
        assert_eq!(valid_bar_times(BarFreq::M10).len(), 24);
    }

    #[test]
    fn m10_times_enumerate_as_spec_literal() {
        let times = valid_bar_times(BarFreq::M10);
        assert_eq!(times[0], hms(9, 40, 0));
        assert_eq!(times[11], hms(11, 30, 0));
        assert_eq!(times[12], hms(13, 10, 0));
        assert_eq!(times[23], hms(15, 0, 0));
    }

    #[test]
    fn bar_time_boundary_s1() {
        // S1: a tick at exactly 09:35:00.000 belongs to the 09:35 bar at 5m.
        assert_eq!(assign_bar_time(hms(9, 35, 0), BarFreq::M5), hms(9, 35, 0));
        // 09:35:00.001 belongs to 09:40.
        let just_after = hms(9, 35, 0) + chrono::Duration::milliseconds(1);
        assert_eq!(assign_bar_time(just_after, BarFreq::M5), hms(9, 40, 0));
    }

    #[test]
    fn opening_auction_adjustment_s2() {
        let adjusted = adjust_special_time(hms(9, 25, 30));
        assert_eq!(adjusted, hms(9, 30, 1));
        assert_eq!(assign_bar_time(adjusted, BarFreq::M5), hms(9, 35, 0));
    }

    #[test]
    fn noon_break_and_closing_auction_adjustment() {
        assert_eq!(adjust_special_time(hms(11, 45, 0)), hms(11, 29, 59));
        assert_eq!(adjust_special_time(hms(15, 3, 0)), hms(14, 59, 59));
        assert_eq!(adjust_special_time(hms(10, 0, 0)), hms(10, 0, 0));
    }

    #[test]
    fn tau_m10_projects_noon_break_and_overflow() {
        assert_eq!(tau_m10(hms(11, 45, 0)), hms(11, 30, 0));
        assert_eq!(tau_m10(hms(15, 3, 0)), hms(15, 0, 0));
        assert_eq!(tau_m10(hms(10, 37, 0)), hms(10, 40, 0));
        assert_eq!(tau_m10(hms(10, 38, 0)), hms(10, 40, 0));
        assert_eq!(tau_m10(hms(15, 0, 0)), hms(15, 0, 0));
    }

    #[test]
    fn trading_time_slices_partition_sessions() {
        let morning = bars_in_slice(BarFreq::M5, TradingTimeSlice::Morning);
        let opening = bars_in_slice(BarFreq::M5, TradingTimeSlice::Opening);
        let morning_mid = bars_in_slice(BarFreq::M5, TradingTimeSlice::MorningMid);
        assert_eq!(opening.len() + morning_mid.len(), morning.len());
    }
}
