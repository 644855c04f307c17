//! Orchestrates raw tick retrieval into a clean, decorated, time-adjusted
//! per-settlement-day tick set ready for bar building.

use crate::data::store::TickStore;
use crate::data::tick::{decorate_symbol, Exchange, QuoteTick, SnapTick, TickKind, TradeTick};
use crate::error::{Result, SurgeError};
use crate::time::{adjust_special_time, TRADING_HOURS_AFTERNOON, TRADING_HOURS_MORNING};
use chrono::{NaiveDate, Timelike};
use std::sync::Arc;

/// Trade ticks with the exchange-side cancel flag dropped, clock adjusted,
/// and symbols decorated, ready for OPS1 bar building.
pub struct LoadedTrades {
    pub date: NaiveDate,
    pub ticks: Vec<TradeTick>,
}

/// Snap ticks adjusted and decorated, ready for OPS2 bar building.
pub struct LoadedSnaps {
    pub date: NaiveDate,
    pub ticks: Vec<SnapTick>,
}

/// Quote ticks adjusted and decorated, carrying the SZ cancel counters.
pub struct LoadedQuotes {
    pub date: NaiveDate,
    pub ticks: Vec<QuoteTick>,
}

fn in_trading_hours(t: chrono::NaiveTime) -> bool {
    let (m_lo, m_hi) = TRADING_HOURS_MORNING();
    let (a_lo, a_hi) = TRADING_HOURS_AFTERNOON();
    (t >= m_lo && t <= m_hi) || (t >= a_lo && t <= a_hi)
}

fn adjusted_time(xts: chrono::NaiveDateTime) -> chrono::NaiveDateTime {
    let adjusted = adjust_special_time(xts.time());
    xts.date().and_time(adjusted)
}

/// Loads, filters, adjusts and decorates trade ticks for one settlement
/// date across both exchanges. A missing partition for either exchange
/// fails the whole task (see [`SurgeError::MissingInput`]); the caller is
/// expected to skip that settlement day entirely.
pub fn load_trades(store: &Arc<dyn TickStore>, date: NaiveDate) -> Result<LoadedTrades> {
    let mut all = Vec::new();
    for exchange in [Exchange::SH, Exchange::SZ] {
        if !store.has_partition(date, exchange, TickKind::Trade) {
            return Err(SurgeError::MissingInput(format!(
                "trade ticks for {date} / {exchange:?}"
            )));
        }
        all.extend(store.scan_trades(date, exchange)?);
    }
    let ticks = all
        .into_iter()
        .filter(|t| t.flag != 52)
        .filter(|t| in_trading_hours(t.xts.time()))
        .filter_map(|mut t| {
            t.xts = adjusted_time(t.xts);
            decorate_symbol(&t.symbol).map(|sym| {
                t.symbol = sym;
                t
            })
        })
        .collect();
    Ok(LoadedTrades { date, ticks })
}

/// Loads, filters, adjusts and decorates snapshot ticks for one settlement
/// date across both exchanges.
pub fn load_snaps(store: &Arc<dyn TickStore>, date: NaiveDate) -> Result<LoadedSnaps> {
    let mut all = Vec::new();
    for exchange in [Exchange::SH, Exchange::SZ] {
        if !store.has_partition(date, exchange, TickKind::Snap) {
            return Err(SurgeError::MissingInput(format!(
                "snap ticks for {date} / {exchange:?}"
            )));
        }
        all.extend(store.scan_snaps(date, exchange)?);
    }
    let ticks = all
        .into_iter()
        .filter(|t| in_trading_hours(t.xts.time()))
        .filter_map(|mut t| {
            t.xts = adjusted_time(t.xts);
            decorate_symbol(&t.symbol).map(|sym| {
                t.symbol = sym;
                t
            })
        })
        .collect();
    Ok(LoadedSnaps { date, ticks })
}

/// Loads, filters, adjusts and decorates quote ticks for one settlement
/// date, SZ only (cancel-order pairing is an SZ-specific feature).
pub fn load_quotes(store: &Arc<dyn TickStore>, date: NaiveDate) -> Result<LoadedQuotes> {
    if !store.has_partition(date, Exchange::SZ, TickKind::Quote) {
        return Err(SurgeError::MissingInput(format!(
            "quote ticks for {date} / SZ"
        )));
    }
    let ticks = store
        .scan_quotes(date, Exchange::SZ)?
        .into_iter()
        .filter(|t| in_trading_hours(t.xts.time()))
        .filter_map(|mut t| {
            t.xts = adjusted_time(t.xts);
            decorate_symbol(&t.symbol).map(|sym| {
                t.symbol = sym;
                t
            })
        })
        .collect();
    Ok(LoadedQuotes { date, ticks })
}

#[allow(dead_code)]
fn ms_of_day(t: chrono::NaiveTime) -> i64 {
    t.num_seconds_from_midnight() as i64 * 1000 + t.nanosecond() as i64 / 1_000_000
}
