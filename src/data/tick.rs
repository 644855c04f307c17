//! Raw exchange tick envelope and symbol decoration.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The exchange a raw symbol code is local to, before decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    SH,
    SZ,
}

impl Exchange {
    pub fn as_str(self) -> &'static str {
        match self {
            Exchange::SH => "SH",
            Exchange::SZ => "SZ",
        }
    }
}

/// A trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: SmolStr,
    pub xts: NaiveDateTime,
    pub price: f64,
    pub volume: i64,
    pub amount: f64,
    /// Exchange-side cancel/abnormal flag. `52` marks a cancelled trade and
    /// is dropped before bar building.
    pub flag: i32,
}

/// A quote snapshot (best bid/ask), carrying the SZ cancel-order counters
/// used to pair withdrawn orders when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub symbol: SmolStr,
    pub xts: NaiveDateTime,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_volume: i64,
    pub ask_volume: i64,
    /// SZ-only: cumulative count of ask-side cancel orders at this tick.
    pub an: Option<i64>,
    /// SZ-only: cumulative count of bid-side cancel orders at this tick.
    pub bn: Option<i64>,
}

/// A periodic market snapshot carrying cumulative turnover/volume-to-date,
/// the source for OPS2 (diff-based) bar building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapTick {
    pub symbol: SmolStr,
    pub xts: NaiveDateTime,
    pub last_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    /// Cumulative turnover (yuan) since session open.
    pub turnover: f64,
    /// Cumulative traded quantity (shares) since session open.
    pub qty: i64,
    /// Previous day's close, carried on every snapshot; the fallback for
    /// the first bucket's `pcls` when there is no prior bucket in the day.
    pub pcls: f64,
}

/// The three tick kinds a [`crate::data::store::TickStore`] can be asked
/// for, tagged so a loader can route generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickKind {
    Trade,
    Quote,
    Snap,
}

impl TickKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TickKind::Trade => "trade",
            TickKind::Quote => "quote",
            TickKind::Snap => "snap",
        }
    }
}

/// Zero-pads a raw numeric symbol code to 6 digits and appends the
/// exchange suffix implied by its leading digits, discarding anything that
/// doesn't match a known SH/SZ/BJ prefix.
///
/// Prefixes: `60`/`68` -> `.SH`; `00`/`30` -> `.SZ`; `8`/`43`/`87` -> `.BJ`.
pub fn decorate_symbol(raw: &str) -> Option<SmolStr> {
    let padded = format!("{raw:0>6}");
    if padded.len() != 6 || !padded.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let suffix = if padded.starts_with("60") || padded.starts_with("68") {
        ".SH"
    } else if padded.starts_with("00") || padded.starts_with("30") {
        ".SZ"
    } else if padded.starts_with('8') || padded.starts_with("43") || padded.starts_with("87") {
        ".BJ"
    } else {
        return None;
    };
    Some(SmolStr::new(format!("{padded}{suffix}")))
}

/// Filters decorated symbols to SH/SZ only, matching the scope of the bar
/// builder and surge detector (BJ-listed names carry no surge factors).
pub fn is_sh_or_sz(symbol: &str) -> bool {
    symbol.ends_with(".SH") || symbol.ends_with(".SZ")
}

/// A `(date, exchange, kind)` key identifying one partition of raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickPartitionKey {
    pub date: NaiveDate,
    pub exchange: Exchange,
    pub kind: TickKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorates_sh_and_sz_prefixes() {
        assert_eq!(decorate_symbol("600519").as_deref(), Some("600519.SH"));
        assert_eq!(decorate_symbol("000001").as_deref(), Some("000001.SZ"));
        assert_eq!(decorate_symbol("300750").as_deref(), Some("300750.SZ"));
        assert_eq!(decorate_symbol("688981").as_deref(), Some("688981.SH"));
    }

    #[test]
    fn zero_pads_short_codes() {
        assert_eq!(decorate_symbol("1").as_deref(), Some("000001.SZ"));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert_eq!(decorate_symbol("123456"), None);
        assert_eq!(decorate_symbol("550000"), None);
    }

    #[test]
    fn bj_is_decorated_but_not_sh_sz() {
        let sym = decorate_symbol("830799").unwrap();
        assert!(sym.ends_with(".BJ"));
        assert!(!is_sh_or_sz(&sym));
        let sym2 = decorate_symbol("430047").unwrap();
        assert!(sym2.ends_with(".BJ"));
    }
}
