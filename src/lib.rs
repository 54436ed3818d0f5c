#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! Calculation core for the vacuum pressure calibration standards.
//!
//! Measurement data arrives as unit-tagged [`values::Quantity`] series; each
//! standard or transfer device contributes a symbolic measurement model
//! ([`model::Model`] over [`expr::Expr`] trees) which the evaluator reduces
//! row by row and the [`uncert::Propagator`] differentiates for GUM-style
//! uncertainty budgets. Dispatch from a standard's name to its
//! implementation goes through the closed [`standard::Registry`].

pub mod constants;
pub mod correction;
pub mod device;
pub mod error;
pub mod eval;
pub mod expansion;
pub mod expr;
pub mod frs5;
pub mod group_normal;
pub mod model;
pub mod standard;
pub mod uncert;
pub mod units;
pub mod values;

pub use error::Error;

pub type Result<T> = ::std::result::Result<T, Error>;
