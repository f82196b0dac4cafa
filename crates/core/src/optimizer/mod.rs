//! Conversion engine: validation, codec selection and artifact bookkeeping.
//!
//! Sits between the callers (batch scheduler, serving path) and the codec
//! capability: validates sources, derives artifact paths, invokes the
//! converter per enabled format, measures savings and records history.

mod engine;
mod types;

pub use engine::Optimizer;
pub use types::{
    ConversionOutcome, ConversionRecord, FormatFailure, OptimizerStats, HISTORY_LIMIT,
};
