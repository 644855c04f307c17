//! Tick storage abstraction: where raw `(date, exchange, kind)` partitions
//! of trade/quote/snap ticks come from.

use crate::data::tick::{Exchange, QuoteTick, SnapTick, TickKind, TradeTick};
use crate::error::{Result, SurgeError};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Source of raw ticks, keyed by `(date, exchange)`. Implementations decide
/// how a partition maps to storage; the loader only calls these three
/// methods and treats a missing partition as [`SurgeError::MissingInput`].
pub trait TickStore: Send + Sync {
    fn scan_trades(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<TradeTick>>;
    fn scan_quotes(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<QuoteTick>>;
    fn scan_snaps(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<SnapTick>>;

    /// Whether a `(date, exchange, kind)` partition exists at all, checked
    /// before a settlement-day task commits to loading it.
    fn has_partition(&self, date: NaiveDate, exchange: Exchange, kind: TickKind) -> bool;
}

/// Reference [`TickStore`] reading Parquet files laid out as
/// `<root>/<kind>/<exchange>/<YYYYMMDD>.parquet`.
pub struct ParquetTickStore {
    root: PathBuf,
}

impl ParquetTickStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn partition_path(&self, kind: TickKind, date: NaiveDate, exchange: Exchange) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(exchange.as_str())
            .join(format!("{}.parquet", date.format("%Y%m%d")))
    }

    fn read_frame(&self, path: &Path) -> Result<DataFrame> {
        if !path.exists() {
            return Err(SurgeError::MissingInput(path.display().to_string()));
        }
        let file = std::fs::File::open(path)?;
        ParquetReader::new(file)
            .finish()
            .map_err(SurgeError::from)
    }
}

fn col_str(df: &DataFrame, name: &str, row: usize) -> Result<String> {
    df.column(name)?
        .str()?
        .get(row)
        .map(|s| s.to_string())
        .ok_or_else(|| SurgeError::SchemaMismatch(format!("null {name} at row {row}")))
}

fn col_f64(df: &DataFrame, name: &str, row: usize) -> Result<f64> {
    df.column(name)?
        .f64()?
        .get(row)
        .ok_or_else(|| SurgeError::SchemaMismatch(format!("null {name} at row {row}")))
}

fn col_i64(df: &DataFrame, name: &str, row: usize) -> Result<i64> {
    df.column(name)?
        .i64()?
        .get(row)
        .ok_or_else(|| SurgeError::SchemaMismatch(format!("null {name} at row {row}")))
}

fn col_i64_opt(df: &DataFrame, name: &str, row: usize) -> Option<i64> {
    df.column(name).ok()?.i64().ok()?.get(row)
}

fn col_datetime(df: &DataFrame, name: &str, row: usize) -> Result<NaiveDateTime> {
    let micros = df
        .column(name)?
        .datetime()?
        .get(row)
        .ok_or_else(|| SurgeError::SchemaMismatch(format!("null {name} at row {row}")))?;
    NaiveDateTime::from_timestamp_micros(micros)
        .ok_or_else(|| SurgeError::SchemaMismatch(format!("bad timestamp in {name}")))
}

impl TickStore for ParquetTickStore {
    fn scan_trades(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<TradeTick>> {
        let path = self.partition_path(TickKind::Trade, date, exchange);
        let df = self.read_frame(&path)?;
        (0..df.height())
            .map(|row| {
                Ok(TradeTick {
                    symbol: col_str(&df, "symbol", row)?.into(),
                    xts: col_datetime(&df, "xts", row)?,
                    price: col_f64(&df, "price", row)?,
                    volume: col_i64(&df, "volume", row)?,
                    amount: col_f64(&df, "amount", row)?,
                    flag: col_i64(&df, "flag", row)? as i32,
                })
            })
            .collect()
    }

    fn scan_quotes(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<QuoteTick>> {
        let path = self.partition_path(TickKind::Quote, date, exchange);
        let df = self.read_frame(&path)?;
        (0..df.height())
            .map(|row| {
                Ok(QuoteTick {
                    symbol: col_str(&df, "symbol", row)?.into(),
                    xts: col_datetime(&df, "xts", row)?,
                    bid_price: col_f64(&df, "bid_price", row)?,
                    ask_price: col_f64(&df, "ask_price", row)?,
                    bid_volume: col_i64(&df, "bid_volume", row)?,
                    ask_volume: col_i64(&df, "ask_volume", row)?,
                    an: col_i64_opt(&df, "an", row),
                    bn: col_i64_opt(&df, "bn", row),
                })
            })
            .collect()
    }

    fn scan_snaps(&self, date: NaiveDate, exchange: Exchange) -> Result<Vec<SnapTick>> {
        let path = self.partition_path(TickKind::Snap, date, exchange);
        let df = self.read_frame(&path)?;
        (0..df.height())
            .map(|row| {
                Ok(SnapTick {
                    symbol: col_str(&df, "symbol", row)?.into(),
                    xts: col_datetime(&df, "xts", row)?,
                    last_price: col_f64(&df, "last_price", row)?,
                    high_price: col_f64(&df, "high_price", row)?,
                    low_price: col_f64(&df, "low_price", row)?,
                    turnover: col_f64(&df, "turnover", row)?,
                    qty: col_i64(&df, "qty", row)?,
                    pcls: col_f64(&df, "pcls", row)?,
                })
            })
            .collect()
    }

    fn has_partition(&self, date: NaiveDate, exchange: Exchange, kind: TickKind) -> bool {
        self.partition_path(kind, date, exchange).exists()
    }
}
