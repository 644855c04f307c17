//! Trading calendar: which dates are business days, and lookups on that axis.

use crate::error::{Result, SurgeError};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Fixed CNY holidays that don't move with the lunar calendar. The lunar
/// holidays (Spring Festival, Qingming, Dragon Boat, Mid-Autumn) are
/// supplied per-year via [`FixedCalendar::with_holidays`] rather than
/// computed, since they have no closed-form date rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedHoliday {
    pub month: u32,
    pub day: u32,
}

const NEW_YEARS_DAY: FixedHoliday = FixedHoliday { month: 1, day: 1 };
const LABOUR_DAY: FixedHoliday = FixedHoliday { month: 5, day: 1 };
const NATIONAL_DAY: FixedHoliday = FixedHoliday { month: 10, day: 1 };

/// A settlement-day calendar: the axis `prev_biz_day`/`biz_days_in_range`
/// operate on. Kept behind a trait so an engine can swap in a richer
/// exchange-published calendar without the rest of the pipeline noticing.
pub trait TradingCalendar: Send + Sync {
    /// Whether `date` is a trading day on this calendar.
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// The business day `n` places before `date` (`n >= 1`). `n == 1` is the
    /// immediately preceding trading day; `date` itself is never returned.
    fn prev_biz_day(&self, date: NaiveDate, n: u32) -> Result<NaiveDate> {
        let mut current = date;
        let mut remaining = n;
        let mut steps = 0;
        while remaining > 0 {
            current = current - Duration::days(1);
            steps += 1;
            if steps > 3650 {
                return Err(SurgeError::CalendarError(format!(
                    "no {n}th prior business day found within 10 years before {date}"
                )));
            }
            if self.is_trading_day(current) {
                remaining -= 1;
            }
        }
        Ok(current)
    }

    /// The business day `n` places after `date` (`n >= 1`).
    fn next_biz_day(&self, date: NaiveDate, n: u32) -> Result<NaiveDate> {
        let mut current = date;
        let mut remaining = n;
        let mut steps = 0;
        while remaining > 0 {
            current = current + Duration::days(1);
            steps += 1;
            if steps > 3650 {
                return Err(SurgeError::CalendarError(format!(
                    "no {n}th following business day found within 10 years after {date}"
                )));
            }
            if self.is_trading_day(current) {
                remaining -= 1;
            }
        }
        Ok(current)
    }

    /// All trading days in `[lo, hi]`, ascending.
    fn biz_days_in_range(&self, lo: NaiveDate, hi: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = lo;
        while current <= hi {
            if self.is_trading_day(current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }

    /// Count of trading days strictly between two business days, used to
    /// size an M10-same-time lookback window before running it.
    fn biz_days_count(&self, lo: NaiveDate, hi: NaiveDate) -> usize {
        self.biz_days_in_range(lo, hi).len()
    }
}

/// A calendar defined by an explicit, closed set of holiday dates layered
/// over a Mon-Fri week. Exchange-published lunar-holiday tables are
/// supplied by the caller; nothing here tries to compute them.
#[derive(Debug, Clone)]
pub struct FixedCalendar {
    holidays: Vec<NaiveDate>,
}

impl FixedCalendar {
    /// A calendar with only the fixed (non-lunar) national holidays for the
    /// given year range, observed-shifted off weekends.
    pub fn new(year_start: i32, year_end: i32) -> Self {
        let mut holidays = Vec::new();
        for year in year_start..=year_end {
            for fixed in [NEW_YEARS_DAY, LABOUR_DAY, NATIONAL_DAY] {
                if let Some(d) = NaiveDate::from_ymd_opt(year, fixed.month, fixed.day) {
                    holidays.push(Self::observed(d));
                }
            }
        }
        holidays.sort();
        holidays.dedup();
        Self { holidays }
    }

    /// Layer explicit extra holiday dates (lunar festivals, ad hoc market
    /// closures) on top of the fixed set.
    pub fn with_holidays(mut self, extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(extra);
        self.holidays.sort();
        self.holidays.dedup();
        self
    }

    fn observed(date: NaiveDate) -> NaiveDate {
        match date.weekday() {
            Weekday::Sat => date + Duration::days(2),
            Weekday::Sun => date + Duration::days(1),
            _ => date,
        }
    }

    fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl TradingCalendar for FixedCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !Self::is_weekend(date) && self.holidays.binary_search(&date).is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_is_trading_day_weekend_is_not() {
        let cal = FixedCalendar::new(2024, 2024);
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert!(cal.is_trading_day(monday));
        assert!(!cal.is_trading_day(saturday));
    }

    #[test]
    fn fixed_holiday_is_excluded() {
        let cal = FixedCalendar::new(2024, 2024);
        assert!(!cal.is_trading_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(!cal.is_trading_day(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
    }

    #[test]
    fn extra_holidays_layer_on_top() {
        let spring_festival = NaiveDate::from_ymd_opt(2024, 2, 12).unwrap();
        let cal = FixedCalendar::new(2024, 2024).with_holidays([spring_festival]);
        assert!(!cal.is_trading_day(spring_festival));
    }

    #[test]
    fn prev_biz_day_skips_weekend() {
        let cal = FixedCalendar::new(2024, 2024);
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let prev = cal.prev_biz_day(monday, 1).unwrap();
        assert_eq!(prev, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn biz_days_in_range_counts_a_five_day_week() {
        let cal = FixedCalendar::new(2024, 2024);
        let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        assert_eq!(cal.biz_days_count(start, end), 5);
    }
}
