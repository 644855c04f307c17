//! # surge_factors
//!
//! A tick-to-factor pipeline for Chinese A-share intraday data: normalizes
//! raw exchange ticks, builds OHLCV bars at one-, five- and ten-minute
//! grids, flags intraday volume surges against a choice of baselines, and
//! emits wide date/symbol factor matrices.
//!
//! ## Example
//!
//! ```rust,no_run
//! use surge_factors::prelude::*;
//! use std::sync::Arc;
//!
//! # fn run(store: Arc<dyn TickStore>, calendar: Arc<dyn TradingCalendar>, specs: &[FactorSpec], dates: &[chrono::NaiveDate]) -> Result<()> {
//! let results = run_all(specs, store, calendar, dates, 4)?;
//! let matrices = build_matrices(&results, |_| 1)?;
//! # Ok(())
//! # }
//! ```

pub mod bars;
pub mod calendar;
pub mod data;
pub mod engine;
pub mod error;
pub mod surge;
pub mod time;

pub mod prelude {
    //! Commonly used types and traits.
    pub use crate::bars::Bar;
    pub use crate::calendar::{FixedCalendar, TradingCalendar};
    pub use crate::data::store::{ParquetTickStore, TickStore};
    pub use crate::data::tick::{Exchange, QuoteTick, SnapTick, TickKind, TradeTick};
    pub use crate::engine::emitter::{build_matrices, FactorMatrix, FactorNamespace, FactorStore};
    pub use crate::engine::factor_engine::{run_all, FactorSpec};
    pub use crate::error::{Result, SurgeError};
    pub use crate::surge::aggregator::{FactorConfig, FactorObservation};
    pub use crate::surge::detector::SurgeMode;
    pub use crate::time::BarFreq;
}
