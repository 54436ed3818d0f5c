use std::collections::BTreeSet;
use std::ops;

use crate::{Error, Result};

/// Named functions appearing in the standards' models.
///
/// Only the operators the modelled standards actually use are supported; this
/// is not a general computer-algebra system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sqrt,
    Sin,
    Cos,
    Ln,
    /// `Abs` has no closed-form derivative across zero. Differentiating a
    /// symbol under it fails with [`Error::UndefinedDerivative`].
    Abs,
}

/// An algebraic expression over named symbols.
///
/// The tree supports the two transformations the engine needs — substitution
/// (see [`crate::eval`]) and symbolic differentiation — both as pure
/// functions. Construction goes through the smart constructors ([`Expr::sum`],
/// [`Expr::product`], [`Expr::pow`], the operator impls), which flatten and
/// constant-fold so that derivative trees stay small.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(f64),
    Symbol(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    /// Integer powers only; rationals are expressed with [`Func::Sqrt`].
    Pow(Box<Expr>, i32),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn sum(terms: Vec<Self>) -> Self {
        let mut constant = 0.0;
        let mut rest = Vec::new();
        for term in terms {
            match term {
                Self::Const(c) => constant += c,
                Self::Add(inner) => {
                    for t in inner {
                        match t {
                            Self::Const(c) => constant += c,
                            other => rest.push(other),
                        }
                    }
                }
                other => rest.push(other),
            }
        }
        if constant != 0.0 || rest.is_empty() {
            rest.push(Self::Const(constant));
        }
        if rest.len() == 1 {
            rest.pop().expect("one element present")
        } else {
            Self::Add(rest)
        }
    }

    pub fn product(factors: Vec<Self>) -> Self {
        let mut constant = 1.0;
        let mut rest = Vec::new();
        for factor in factors {
            match factor {
                Self::Const(c) => constant *= c,
                Self::Mul(inner) => {
                    for f in inner {
                        match f {
                            Self::Const(c) => constant *= c,
                            other => rest.push(other),
                        }
                    }
                }
                other => rest.push(other),
            }
        }
        if constant == 0.0 {
            return Self::Const(0.0);
        }
        if (constant - 1.0).abs() > f64::EPSILON || rest.is_empty() {
            rest.insert(0, Self::Const(constant));
        }
        if rest.len() == 1 {
            rest.pop().expect("one element present")
        } else {
            Self::Mul(rest)
        }
    }

    pub fn pow(base: Self, exponent: i32) -> Self {
        match (base, exponent) {
            (_, 0) => Self::Const(1.0),
            (base, 1) => base,
            (Self::Const(c), n) => Self::Const(c.powi(n)),
            (Self::Pow(inner, m), n) => Self::Pow(inner, m * n),
            (base, n) => Self::Pow(Box::new(base), n),
        }
    }

    pub fn call(func: Func, argument: Self) -> Self {
        Self::Call(func, Box::new(argument))
    }

    pub fn sqrt(argument: Self) -> Self {
        Self::call(Func::Sqrt, argument)
    }

    /// The set of free symbols, in lexicographic order.
    pub fn free_symbols(&self) -> BTreeSet<&str> {
        let mut set = BTreeSet::new();
        self.collect_symbols(&mut set);
        set
    }

    fn collect_symbols<'a>(&'a self, set: &mut BTreeSet<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Symbol(name) => {
                set.insert(name.as_str());
            }
            Self::Add(terms) | Self::Mul(terms) => {
                for term in terms {
                    term.collect_symbols(set);
                }
            }
            Self::Pow(base, _) => base.collect_symbols(set),
            Self::Call(_, argument) => argument.collect_symbols(set),
        }
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Self::Const(_) => false,
            Self::Symbol(s) => s == name,
            Self::Add(terms) | Self::Mul(terms) => terms.iter().any(|t| t.contains_symbol(name)),
            Self::Pow(base, _) => base.contains_symbol(name),
            Self::Call(_, argument) => argument.contains_symbol(name),
        }
    }

    /// The partial derivative with respect to `symbol`, as a new expression.
    ///
    /// # Errors
    /// [`Error::UndefinedDerivative`] when `symbol` appears under a term with
    /// no closed-form derivative ([`Func::Abs`]). The error is raised, never
    /// silently approximated.
    pub fn diff(&self, symbol: &str) -> Result<Self> {
        match self {
            Self::Const(_) => Ok(Self::Const(0.0)),
            Self::Symbol(name) => Ok(Self::Const(if name == symbol { 1.0 } else { 0.0 })),
            Self::Add(terms) => {
                let derivatives = terms
                    .iter()
                    .map(|t| t.diff(symbol))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::sum(derivatives))
            }
            Self::Mul(factors) => {
                // product rule: sum over factors of f_i' * prod_{j != i} f_j
                let mut terms = Vec::with_capacity(factors.len());
                for (i, factor) in factors.iter().enumerate() {
                    if !factor.contains_symbol(symbol) {
                        continue;
                    }
                    let mut product = vec![factor.diff(symbol)?];
                    for (j, other) in factors.iter().enumerate() {
                        if i != j {
                            product.push(other.clone());
                        }
                    }
                    terms.push(Self::product(product));
                }
                Ok(Self::sum(terms))
            }
            Self::Pow(base, n) => {
                if !base.contains_symbol(symbol) {
                    return Ok(Self::Const(0.0));
                }
                let inner = base.diff(symbol)?;
                Ok(Self::product(vec![
                    Self::Const(f64::from(*n)),
                    Self::pow((**base).clone(), n - 1),
                    inner,
                ]))
            }
            Self::Call(func, argument) => {
                if !argument.contains_symbol(symbol) {
                    return Ok(Self::Const(0.0));
                }
                let inner = argument.diff(symbol)?;
                let outer = match func {
                    // d sqrt(a) = 1 / (2 sqrt(a))
                    Func::Sqrt => Self::product(vec![
                        Self::Const(0.5),
                        Self::pow(Self::sqrt((**argument).clone()), -1),
                    ]),
                    Func::Sin => Self::call(Func::Cos, (**argument).clone()),
                    Func::Cos => Self::product(vec![
                        Self::Const(-1.0),
                        Self::call(Func::Sin, (**argument).clone()),
                    ]),
                    Func::Ln => Self::pow((**argument).clone(), -1),
                    Func::Abs => {
                        return Err(Error::UndefinedDerivative {
                            symbol: symbol.to_owned(),
                        })
                    }
                };
                Ok(Self::product(vec![outer, inner]))
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

impl ops::Add for Expr {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::sum(vec![self, rhs])
    }
}

impl ops::Sub for Expr {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::sum(vec![self, Self::product(vec![Self::Const(-1.0), rhs])])
    }
}

impl ops::Mul for Expr {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::product(vec![self, rhs])
    }
}

impl ops::Div for Expr {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::product(vec![self, Self::pow(rhs, -1)])
    }
}

impl ops::Neg for Expr {
    type Output = Self;
    fn neg(self) -> Self {
        Self::product(vec![Self::Const(-1.0), self])
    }
}
