//! Builds OHLCV bars from raw ticks via two paths: OPS1 (sum-aggregate over
//! trade prints) and OPS2 (cumulative-diff over periodic snapshots).

use crate::bars::bar::Bar;
use crate::data::tick::{SnapTick, TradeTick};
use crate::time::{assign_bar_time, BarFreq};
use chrono::{NaiveDate, NaiveTime};
use hashbrown::HashMap;
use smol_str::SmolStr;

struct TradeAcc {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    amount: f64,
}

/// OPS1: aggregate trade prints into bars by summing price*volume within
/// each `(symbol, bar_time)` bucket for the day.
pub fn build_bars_ops1(ticks: &[TradeTick], date: NaiveDate, freq: BarFreq) -> Vec<Bar> {
    let mut by_symbol: HashMap<SmolStr, Vec<&TradeTick>> = HashMap::new();
    for t in ticks {
        by_symbol.entry(t.symbol.clone()).or_default().push(t);
    }

    let mut bars = Vec::new();
    for (symbol, mut trades) in by_symbol {
        trades.sort_by_key(|t| t.xts);

        let mut buckets: HashMap<NaiveTime, TradeAcc> = HashMap::new();
        let mut bucket_order: Vec<NaiveTime> = Vec::new();
        for t in trades {
            let bar_time = assign_bar_time(t.xts.time(), freq);
            buckets
                .entry(bar_time)
                .and_modify(|acc| {
                    acc.high = acc.high.max(t.price);
                    acc.low = acc.low.min(t.price);
                    acc.close = t.price;
                    acc.volume += t.volume;
                    acc.amount += t.amount;
                })
                .or_insert_with(|| {
                    bucket_order.push(bar_time);
                    TradeAcc {
                        open: t.price,
                        high: t.price,
                        low: t.price,
                        close: t.price,
                        volume: t.volume,
                        amount: t.amount,
                    }
                });
        }

        bucket_order.sort();
        let mut pcls: Option<f64> = None;
        for bar_time in bucket_order {
            let acc = &buckets[&bar_time];
            let vwap = Bar::vwap_of(acc.amount, acc.volume);
            let ret = Bar::ret_of(acc.close, pcls);
            bars.push(Bar {
                symbol: symbol.clone(),
                date,
                bar_time,
                open: acc.open,
                high: acc.high,
                low: acc.low,
                close: acc.close,
                volume: acc.volume,
                amount: acc.amount,
                vwap,
                ret,
            });
            pcls = Some(acc.close);
        }
    }

    bars.sort_by(|a, b| (a.symbol.as_str(), a.bar_time).cmp(&(b.symbol.as_str(), b.bar_time)));
    bars
}

struct SnapAcc {
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    amount: f64,
}

/// OPS2: aggregate periodic cumulative snapshots by diffing consecutive
/// turnover/qty readings per symbol, then summing the diffs within each
/// `(symbol, bar_time)` bucket. The open of a bucket is the close of the
/// preceding bucket (falling back to the first observed price when there
/// is none), since a snapshot carries no true intra-bucket open.
pub fn build_bars_ops2(ticks: &[SnapTick], date: NaiveDate, freq: BarFreq) -> Vec<Bar> {
    let mut by_symbol: HashMap<SmolStr, Vec<&SnapTick>> = HashMap::new();
    for t in ticks {
        by_symbol.entry(t.symbol.clone()).or_default().push(t);
    }

    let mut bars = Vec::new();
    for (symbol, mut snaps) in by_symbol {
        snaps.sort_by_key(|t| t.xts);

        let mut buckets: HashMap<NaiveTime, SnapAcc> = HashMap::new();
        let mut bucket_order: Vec<NaiveTime> = Vec::new();
        let mut prev_qty: Option<i64> = None;
        let mut prev_turnover: Option<f64> = None;
        let pcls_orig = snaps.first().map(|t| t.pcls).unwrap_or(0.0);
        for t in &snaps {
            let d_vol = match prev_qty {
                Some(p) => (t.qty - p).max(0),
                None => t.qty,
            };
            let d_amt = match prev_turnover {
                Some(p) => (t.turnover - p).max(0.0),
                None => t.turnover,
            };
            prev_qty = Some(t.qty);
            prev_turnover = Some(t.turnover);

            let bar_time = assign_bar_time(t.xts.time(), freq);
            buckets
                .entry(bar_time)
                .and_modify(|acc| {
                    acc.high = acc.high.max(t.high_price);
                    acc.low = acc.low.min(t.low_price);
                    acc.close = t.last_price;
                    acc.volume += d_vol;
                    acc.amount += d_amt;
                })
                .or_insert_with(|| {
                    bucket_order.push(bar_time);
                    SnapAcc {
                        high: t.high_price,
                        low: t.low_price,
                        close: t.last_price,
                        volume: d_vol,
                        amount: d_amt,
                    }
                });
        }

        bucket_order.sort();
        // First bucket's pcls falls back to the snapshot's own `pcls` field
        // (yesterday's close), so it still carries a real return rather than
        // forcing `ret = None` the way a missing previous bucket would.
        let mut pcls: Option<f64> = Some(pcls_orig);
        let mut prev_close: Option<f64> = None;
        for bar_time in bucket_order {
            let acc = &buckets[&bar_time];
            let open = match prev_close {
                Some(c) => c,
                None => acc.close,
            };
            let vwap = Bar::vwap_of(acc.amount, acc.volume);
            let ret = Bar::ret_of(acc.close, pcls);
            bars.push(Bar {
                symbol: symbol.clone(),
                date,
                bar_time,
                open,
                high: acc.high.max(open),
                low: acc.low.min(open),
                close: acc.close,
                volume: acc.volume,
                amount: acc.amount,
                vwap,
                ret,
            });
            prev_close = Some(acc.close);
            pcls = Some(acc.close);
        }
    }

    bars.sort_by(|a, b| (a.symbol.as_str(), a.bar_time).cmp(&(b.symbol.as_str(), b.bar_time)));
    bars
}

/// Adds `bar_ret = (close - open) / open`, `None` when `open <= 0`, used by
/// the surge detector rather than stored on [`Bar`] itself.
pub fn bar_ret(bar: &Bar) -> Option<f64> {
    if bar.open > 0.0 {
        Some((bar.close - bar.open) / bar.open)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn ops1_aggregates_trades_into_one_bucket() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let ticks = vec![
            TradeTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:32:00"),
                price: 10.0,
                volume: 100,
                amount: 1000.0,
                flag: 0,
            },
            TradeTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:34:00"),
                price: 11.0,
                volume: 50,
                amount: 550.0,
                flag: 0,
            },
        ];
        let bars = build_bars_ops1(&ticks, date, BarFreq::M5);
        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.bar_time, NaiveTime::from_hms_opt(9, 35, 0).unwrap());
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.close, 11.0);
        assert_eq!(bar.high, 11.0);
        assert_eq!(bar.low, 10.0);
        assert_eq!(bar.volume, 150);
        assert_eq!(bar.vwap, Some(1550.0 / 150.0));
        assert_eq!(bar.ret, None);
    }

    #[test]
    fn ops1_second_bar_gets_previous_close_return() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let ticks = vec![
            TradeTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:32:00"),
                price: 10.0,
                volume: 100,
                amount: 1000.0,
                flag: 0,
            },
            TradeTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:37:00"),
                price: 11.0,
                volume: 100,
                amount: 1100.0,
                flag: 0,
            },
        ];
        let bars = build_bars_ops1(&ticks, date, BarFreq::M5);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].ret, Some(0.1));
    }

    #[test]
    fn ops2_diffs_cumulative_turnover_and_qty() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let ticks = vec![
            SnapTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:31:00"),
                last_price: 10.0,
                high_price: 10.0,
                low_price: 10.0,
                turnover: 1000.0,
                qty: 100,
                pcls: 9.5,
            },
            SnapTick {
                symbol: "600519.SH".into(),
                xts: dt("2024-01-08 09:36:00"),
                last_price: 10.5,
                high_price: 10.6,
                low_price: 10.0,
                turnover: 2500.0,
                qty: 240,
                pcls: 9.5,
            },
        ];
        let bars = build_bars_ops2(&ticks, date, BarFreq::M5);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 100);
        assert_eq!(bars[1].volume, 140);
        assert_eq!(bars[1].amount, 1500.0);
        assert_eq!(bars[1].open, 10.0);
        // First bucket's return falls back to the snapshot's own `pcls`
        // field rather than being forced to null.
        assert_eq!(bars[0].ret, Some(10.0 / 9.5 - 1.0));
        assert_eq!(bars[1].ret, Some(10.5 / 10.0 - 1.0));
    }
}
