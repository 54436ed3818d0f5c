use std::collections::HashMap;

use itertools::Itertools;
use ndarray::Array1;

use crate::expr::{Expr, Func};
use crate::{Error, Result};

/// A concrete value bound to a model symbol: one scalar broadcast over all
/// measurement rows, or one value per row.
#[derive(Clone, Debug)]
pub enum Binding {
    Scalar(f64),
    Array(Array1<f64>),
}

impl Binding {
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(values) => Some(values.len()),
        }
    }
}

impl From<f64> for Binding {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Array1<f64>> for Binding {
    fn from(values: Array1<f64>) -> Self {
        Self::Array(values)
    }
}

pub type Bindings = HashMap<String, Binding>;

/// The row count shared by all array bindings.
///
/// Scalars broadcast, so a binding set without any array has one row.
///
/// # Errors
/// [`Error::ShapeMismatch`] when two array bindings disagree in length.
pub fn broadcast_len(bindings: &Bindings) -> Result<usize> {
    let mut rows: Option<(usize, &str)> = None;
    // sorted iteration keeps the reported offender deterministic
    for name in bindings.keys().sorted() {
        if let Some(len) = bindings[name].len() {
            match rows {
                None => rows = Some((len, name)),
                Some((expected, _)) if expected != len => {
                    return Err(Error::ShapeMismatch {
                        symbol: name.clone(),
                        len,
                        expected,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(rows.map_or(1, |(len, _)| len))
}

/// Intermediate result of a tree walk; scalars stay scalar until the end so
/// that constant subtrees are not materialised per row.
#[derive(Clone, Debug)]
enum Value {
    Scalar(f64),
    Array(Array1<f64>),
}

impl Value {
    fn zip_with(self, other: Self, op: impl Fn(f64, f64) -> f64) -> Self {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(op(a, b)),
            (Self::Scalar(a), Self::Array(b)) => Self::Array(b.mapv(|bi| op(a, bi))),
            (Self::Array(a), Self::Scalar(b)) => Self::Array(a.mapv(|ai| op(ai, b))),
            (Self::Array(a), Self::Array(b)) => {
                Self::Array(ndarray::Zip::from(&a).and(&b).map_collect(|&ai, &bi| op(ai, bi)))
            }
        }
    }

    fn map(self, op: impl Fn(f64) -> f64) -> Self {
        match self {
            Self::Scalar(a) => Self::Scalar(op(a)),
            Self::Array(a) => Self::Array(a.mapv(op)),
        }
    }

    fn into_array(self, rows: usize) -> Array1<f64> {
        match self {
            Self::Scalar(a) => Array1::from_elem(rows, a),
            Self::Array(a) => a,
        }
    }
}

impl Func {
    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Ln => x.ln(),
            Self::Abs => x.abs(),
        }
    }
}

/// Substitute `bindings` into `expr` and reduce elementwise.
///
/// The result has one row per input measurement row, in the order the rows
/// were bound — the engine never reorders a measurement series.
///
/// # Errors
/// - [`Error::ShapeMismatch`] for array bindings of unequal length.
/// - [`Error::ModelDefinition`] for a free symbol without a binding.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<Array1<f64>> {
    evaluate_in("expression", expr, bindings)
}

/// As [`evaluate`], reporting `context` as the model name in errors.
pub fn evaluate_in(context: &str, expr: &Expr, bindings: &Bindings) -> Result<Array1<f64>> {
    let rows = broadcast_len(bindings)?;
    Ok(reduce(context, expr, bindings)?.into_array(rows))
}

fn reduce(context: &str, expr: &Expr, bindings: &Bindings) -> Result<Value> {
    match expr {
        Expr::Const(c) => Ok(Value::Scalar(*c)),
        Expr::Symbol(name) => match bindings.get(name) {
            Some(Binding::Scalar(v)) => Ok(Value::Scalar(*v)),
            Some(Binding::Array(v)) => Ok(Value::Array(v.clone())),
            None => Err(Error::ModelDefinition {
                model: context.to_owned(),
                symbol: name.clone(),
            }),
        },
        Expr::Add(terms) => terms
            .iter()
            .map(|t| reduce(context, t, bindings))
            .fold_ok(Value::Scalar(0.0), |acc, v| acc.zip_with(v, |a, b| a + b)),
        Expr::Mul(factors) => factors
            .iter()
            .map(|f| reduce(context, f, bindings))
            .fold_ok(Value::Scalar(1.0), |acc, v| acc.zip_with(v, |a, b| a * b)),
        Expr::Pow(base, n) => Ok(reduce(context, base, bindings)?.map(|b| b.powi(*n))),
        Expr::Call(func, argument) => Ok(reduce(context, argument, bindings)?.map(|a| func.apply(a))),
    }
}
