use thiserror::Error;

use crate::units::Unit;

/// Failure modes of the calculation core.
///
/// Every variant is raised synchronously by the call that detects it and is
/// never retried internally: the computations are pure, so a retry with the
/// same inputs cannot change the outcome.
#[derive(Debug, Error)]
pub enum Error {
    /// A model symbol could not be resolved to a quantity or parameter.
    #[error("model `{model}` requires symbol `{symbol}` but no quantity or parameter was supplied")]
    ModelDefinition { model: String, symbol: String },

    /// Array bindings of differing lengths were supplied to one evaluation.
    #[error("array binding `{symbol}` has length {len}, expected {expected}")]
    ShapeMismatch {
        symbol: String,
        len: usize,
        expected: usize,
    },

    /// The units belong to different dimensions, no conversion exists.
    #[error("cannot convert {from} to {to}")]
    UnitMismatch { from: Unit, to: Unit },

    /// The model has no closed-form derivative with respect to the symbol.
    #[error("model is not differentiable with respect to `{symbol}`")]
    UndefinedDerivative { symbol: String },

    #[error("unknown standard `{0}`")]
    UnknownStandard(String),

    #[error("unknown gas `{0}`")]
    UnknownGas(String),

    /// The constants table or a standard configuration failed to parse.
    #[error("malformed configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// A device calibration curve failed to parse.
    #[error("malformed calibration curve: {0}")]
    Curve(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
