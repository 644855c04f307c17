//! OHLCV bar model and the two bar-building paths.

pub mod bar;
pub mod builder;

pub use bar::Bar;
