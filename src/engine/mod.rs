//! Settlement-day orchestration, parallel fan-out, and factor emission.

pub mod emitter;
pub mod factor_engine;
