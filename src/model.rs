use std::collections::HashMap;

use ndarray::Array1;

use crate::eval::{self, Binding, Bindings};
use crate::expr::Expr;
use crate::units::Unit;
use crate::values::Quantity;
use crate::{Error, Result};

/// How a model symbol is supplied at evaluation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Bound to a measured [`Quantity`] series.
    Measured,
    /// Bound to a scalar calibration parameter.
    Parameter,
    /// Bound to a value from the injected constant table.
    Constant,
}

/// An algebraic variable of a model: name, expected unit, and role.
///
/// Symbols are immutable and unique by name within one model's scope.
#[derive(Clone, Debug)]
pub struct Symbol {
    name: String,
    unit: Unit,
    role: Role,
}

impl Symbol {
    pub fn new(name: impl Into<String>, unit: Unit, role: Role) -> Self {
        Self {
            name: name.into(),
            unit,
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn role(&self) -> Role {
        self.role
    }
}

/// The measured quantities and scalar parameters a model is evaluated over.
#[derive(Clone, Debug, Default)]
pub struct Inputs {
    quantities: HashMap<String, Quantity>,
    parameters: HashMap<String, f64>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a measured quantity under its channel name.
    #[must_use]
    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantities.insert(quantity.name().to_owned(), quantity);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn quantity(&self, name: &str) -> Option<&Quantity> {
        self.quantities.get(name)
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn insert_parameter(&mut self, name: impl Into<String>, value: f64) {
        self.parameters.insert(name.into(), value);
    }
}

/// A standard's measurement model: an expression tree over declared symbols.
///
/// The expression is built once per standard; every free symbol must be
/// declared, and every declared symbol must be resolvable to a quantity or
/// parameter when the model is bound.
#[derive(Clone, Debug)]
pub struct Model {
    name: String,
    expr: Expr,
    symbols: Vec<Symbol>,
    unit: Unit,
}

impl Model {
    /// # Errors
    /// [`Error::ModelDefinition`] when the expression contains a free symbol
    /// that is not declared in `symbols`.
    pub fn new(
        name: impl Into<String>,
        expr: Expr,
        symbols: Vec<Symbol>,
        unit: Unit,
    ) -> Result<Self> {
        let name = name.into();
        for free in expr.free_symbols() {
            if !symbols.iter().any(|s| s.name() == free) {
                return Err(Error::ModelDefinition {
                    model: name.clone(),
                    symbol: free.to_owned(),
                });
            }
        }
        Ok(Self {
            name,
            expr,
            symbols,
            unit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Declared symbols, in declaration order. Uncertainty breakdowns follow
    /// this order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name() == name)
    }

    /// Resolve every declared symbol to a binding.
    ///
    /// A quantity bound to a symbol is first converted to the symbol's
    /// declared unit — deterministic conversion, never silent coercion.
    /// Parameters are taken to be stated in the symbol's unit already.
    ///
    /// # Errors
    /// - [`Error::ModelDefinition`] when a symbol has neither a quantity nor
    ///   a parameter.
    /// - [`Error::UnitMismatch`] when a quantity's unit cannot be converted
    ///   to the symbol's unit.
    pub fn bind(&self, inputs: &Inputs) -> Result<Bindings> {
        let mut bindings = Bindings::new();
        for symbol in &self.symbols {
            let binding = if let Some(quantity) = inputs.quantity(symbol.name()) {
                Binding::Array(quantity.convert_to(symbol.unit())?.values().clone())
            } else if let Some(value) = inputs.parameter(symbol.name()) {
                Binding::Scalar(value)
            } else {
                return Err(Error::ModelDefinition {
                    model: self.name.clone(),
                    symbol: symbol.name().to_owned(),
                });
            };
            bindings.insert(symbol.name().to_owned(), binding);
        }
        Ok(bindings)
    }

    /// The standard uncertainties of the bound symbols, in the symbols'
    /// declared units.
    ///
    /// A measured quantity contributes its per-sample stdev (scaled to the
    /// symbol unit); a parameter contributes the scalar supplied as the
    /// `u_<symbol>` parameter. Symbols without either are omitted — they are
    /// exact by declaration, not uncertain with zero spread.
    ///
    /// # Errors
    /// [`Error::UnitMismatch`] when a stdev cannot be scaled to the symbol
    /// unit.
    pub fn stdev_bindings(&self, inputs: &Inputs) -> Result<Bindings> {
        let mut stdevs = Bindings::new();
        for symbol in &self.symbols {
            if let Some(quantity) = inputs.quantity(symbol.name()) {
                if quantity.stdev().is_some() {
                    let converted = quantity.convert_to(symbol.unit())?;
                    let stdev = converted.stdev().expect("stdev survives conversion");
                    stdevs.insert(symbol.name().to_owned(), Binding::Array(stdev.clone()));
                }
            } else if let Some(u) = inputs.parameter(&format!("u_{}", symbol.name())) {
                stdevs.insert(symbol.name().to_owned(), Binding::Scalar(u));
            }
        }
        Ok(stdevs)
    }

    /// Substitute bindings and reduce to one result row per measurement row.
    ///
    /// # Errors
    /// Propagates [`Error::ShapeMismatch`] and [`Error::ModelDefinition`]
    /// from evaluation.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Array1<f64>> {
        eval::evaluate_in(&self.name, &self.expr, bindings)
    }

    /// Unit conversion factor from this model's result unit to `unit`.
    ///
    /// # Errors
    /// [`Error::UnitMismatch`] across dimensions.
    pub fn conversion_to(&self, unit: Unit) -> Result<crate::units::Conversion> {
        self.unit.conversion_to(unit)
    }
}
