use std::collections::HashMap;

use itertools::Itertools;
use ndarray::{Array1, Array2};

use crate::eval::{self, broadcast_len, Binding, Bindings};
use crate::expr::Expr;
use crate::model::Model;
use crate::{Error, Result};

/// One input symbol's share of the combined uncertainty.
///
/// `contribution = partial * stdev`, signed: the sign carries into the
/// correlation cross terms of the quadratic form. A zero-stdev symbol is
/// still differentiated and reported, with a zero contribution, so that the
/// budget stays auditable.
#[derive(Clone, Debug)]
pub struct UncertaintyContribution {
    pub symbol: String,
    pub partial: Array1<f64>,
    pub stdev: Array1<f64>,
    pub contribution: Array1<f64>,
}

/// Combined uncertainty with its per-symbol breakdown, in model symbol
/// declaration order.
#[derive(Clone, Debug)]
pub struct Propagated {
    pub total: Array1<f64>,
    pub contributions: Vec<UncertaintyContribution>,
}

/// GUM-style propagation over a model.
///
/// Each partial derivative is derived symbolically exactly once per
/// `(model, symbol)` pair and cached; repeated propagation over new
/// measurement batches re-evaluates the cached expressions only.
#[derive(Clone, Debug)]
pub struct Propagator {
    model: Model,
    derivatives: HashMap<String, Expr>,
}

impl Propagator {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            derivatives: HashMap::new(),
        }
    }

    pub const fn model(&self) -> &Model {
        &self.model
    }

    /// The cached partial derivative of the model with respect to `symbol`.
    ///
    /// # Errors
    /// [`Error::UndefinedDerivative`] if the model has no closed-form
    /// derivative at `symbol`.
    pub fn derivative(&mut self, symbol: &str) -> Result<&Expr> {
        if !self.derivatives.contains_key(symbol) {
            let derivative = self.model.expr().diff(symbol)?;
            self.derivatives.insert(symbol.to_owned(), derivative);
        }
        Ok(&self.derivatives[symbol])
    }

    /// Propagate the input standard deviations through the model.
    ///
    /// `point` holds the operating-point bindings, `stdevs` the standard
    /// deviation of every symbol treated as uncertain (in the symbol's
    /// declared unit; zero is a valid, reported spread). When `correlation`
    /// is given it must be the square correlation matrix over the uncertain
    /// symbols in model declaration order; the combination is then the full
    /// quadratic form including the `2 c_i c_j rho_ij` cross terms. Without
    /// it the contributions combine as a plain root-sum-of-squares.
    ///
    /// # Errors
    /// - [`Error::UndefinedDerivative`] for a non-differentiable symbol.
    /// - [`Error::ShapeMismatch`] for misaligned stdev arrays or a
    ///   correlation matrix of the wrong dimension.
    /// - Evaluation errors from the operating point (see [`eval`]).
    pub fn propagate(
        &mut self,
        point: &Bindings,
        stdevs: &Bindings,
        correlation: Option<&Array2<f64>>,
    ) -> Result<Propagated> {
        let rows = broadcast_len(point)?;
        let model_name = self.model.name().to_owned();

        // model declaration order keeps the breakdown and the correlation
        // matrix indexing stable
        let uncertain: Vec<String> = self
            .model
            .symbols()
            .iter()
            .map(|s| s.name().to_owned())
            .filter(|name| stdevs.contains_key(name))
            .collect();

        let mut contributions = Vec::with_capacity(uncertain.len());
        for name in &uncertain {
            let stdev = match &stdevs[name] {
                Binding::Scalar(u) => Array1::from_elem(rows, *u),
                Binding::Array(u) => {
                    if u.len() != rows {
                        return Err(Error::ShapeMismatch {
                            symbol: name.clone(),
                            len: u.len(),
                            expected: rows,
                        });
                    }
                    u.clone()
                }
            };

            let derivative = self.derivative(name)?;
            let partial = eval::evaluate_in(&model_name, derivative, point)?;
            let contribution = &partial * &stdev;

            contributions.push(UncertaintyContribution {
                symbol: name.clone(),
                partial,
                stdev,
                contribution,
            });
        }

        let total = match correlation {
            None => {
                let mut sum = Array1::zeros(rows);
                for c in &contributions {
                    sum = sum + c.contribution.mapv(|x| x * x);
                }
                sum.mapv(f64::sqrt)
            }
            Some(rho) => {
                if rho.dim() != (uncertain.len(), uncertain.len()) {
                    return Err(Error::ShapeMismatch {
                        symbol: "correlation".to_owned(),
                        len: rho.dim().0,
                        expected: uncertain.len(),
                    });
                }
                let mut sum = Array1::zeros(rows);
                for (i, c) in contributions.iter().enumerate() {
                    sum = sum + c.contribution.mapv(|x| x * x) * rho[[i, i]];
                }
                for (i, j) in (0..contributions.len()).tuple_combinations() {
                    let cross =
                        &contributions[i].contribution * &contributions[j].contribution;
                    sum = sum + cross * (2.0 * rho[[i, j]]);
                }
                sum.mapv(f64::sqrt)
            }
        };

        Ok(Propagated {
            total,
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, Array2};

    use super::Propagator;
    use crate::eval::Binding;
    use crate::expr::{Expr, Func};
    use crate::model::{Model, Role, Symbol};
    use crate::units::Unit;

    fn piston_model() -> Model {
        Model::new(
            "piston",
            Expr::symbol("F") / Expr::symbol("A"),
            vec![
                Symbol::new("F", Unit::Newton, Role::Measured),
                Symbol::new("A", Unit::SquareMeter, Role::Parameter),
            ],
            Unit::Pascal,
        )
        .unwrap()
    }

    fn bindings(pairs: Vec<(&str, Binding)>) -> crate::eval::Bindings {
        pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn force_over_area_relative_uncertainty_matches_hand_derivation() {
        // p = F/A with F = 500 N +- 0.5 N, A = 5 cm^2 exact:
        // u(p)/p = u(F)/F = 0.1 %
        let mut propagator = Propagator::new(piston_model());
        let point = bindings(vec![
            ("F", arr1(&[500.0]).into()),
            ("A", 5e-4.into()),
        ]);
        let stdevs = bindings(vec![("F", 0.5.into()), ("A", 0.0.into())]);

        let result = propagator.propagate(&point, &stdevs, None).unwrap();
        let p = 500.0 / 5e-4;
        approx::assert_relative_eq!(result.total[0] / p, 0.001, max_relative = 1e-12);

        // the exact area still shows up in the breakdown, with zero share
        assert_eq!(result.contributions.len(), 2);
        let area = &result.contributions[1];
        assert_eq!(area.symbol, "A");
        approx::assert_relative_eq!(area.contribution[0], 0.0);
        assert!(area.partial[0] != 0.0);
    }

    #[test]
    fn all_zero_stdevs_propagate_to_an_all_zero_total() {
        let mut propagator = Propagator::new(piston_model());
        let point = bindings(vec![
            ("F", arr1(&[500.0, 400.0, 300.0]).into()),
            ("A", 5e-4.into()),
        ]);
        let stdevs = bindings(vec![
            ("F", arr1(&[0.0, 0.0, 0.0]).into()),
            ("A", 0.0.into()),
        ]);

        let result = propagator.propagate(&point, &stdevs, None).unwrap();
        assert_eq!(result.contributions.len(), 2);
        for row in 0..3 {
            approx::assert_relative_eq!(result.total[row], 0.0);
            for c in &result.contributions {
                approx::assert_relative_eq!(c.contribution[row], 0.0);
            }
        }
    }

    #[test]
    fn identity_correlation_reduces_to_root_sum_of_squares() {
        let mut propagator = Propagator::new(piston_model());
        let point = bindings(vec![
            ("F", arr1(&[500.0, 123.0]).into()),
            ("A", 5e-4.into()),
        ]);
        let stdevs = bindings(vec![("F", 0.5.into()), ("A", 2e-7.into())]);

        let plain = propagator.propagate(&point, &stdevs, None).unwrap();
        let identity = propagator
            .propagate(&point, &stdevs, Some(&Array2::eye(2)))
            .unwrap();

        for row in 0..2 {
            approx::assert_relative_eq!(
                plain.total[row],
                identity.total[row],
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn full_positive_correlation_adds_contributions_linearly() {
        // p = a + b, both with unit partials; rho = 1 turns the quadratic
        // form into (c_a + c_b)^2
        let model = Model::new(
            "sum",
            Expr::symbol("a") + Expr::symbol("b"),
            vec![
                Symbol::new("a", Unit::Pascal, Role::Measured),
                Symbol::new("b", Unit::Pascal, Role::Measured),
            ],
            Unit::Pascal,
        )
        .unwrap();
        let mut propagator = Propagator::new(model);
        let point = bindings(vec![
            ("a", arr1(&[10.0]).into()),
            ("b", arr1(&[20.0]).into()),
        ]);
        let stdevs = bindings(vec![("a", 0.3.into()), ("b", 0.4.into())]);

        let rho = Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let result = propagator.propagate(&point, &stdevs, Some(&rho)).unwrap();
        approx::assert_relative_eq!(result.total[0], 0.7, max_relative = 1e-12);
    }

    #[test]
    fn repeated_propagation_reuses_the_derivative_cache() {
        let mut propagator = Propagator::new(piston_model());
        let point = bindings(vec![
            ("F", arr1(&[500.0]).into()),
            ("A", 5e-4.into()),
        ]);
        let stdevs = bindings(vec![("F", 0.5.into())]);

        let first = propagator.propagate(&point, &stdevs, None).unwrap();
        let second = propagator.propagate(&point, &stdevs, None).unwrap();
        assert_eq!(first.total, second.total);

        // the cache holds the derivative after first use
        assert!(propagator.derivatives.contains_key("F"));
    }

    #[test]
    fn non_differentiable_term_raises_undefined_derivative() {
        let model = Model::new(
            "kinked",
            Expr::call(Func::Abs, Expr::symbol("x")),
            vec![Symbol::new("x", Unit::One, Role::Measured)],
            Unit::One,
        )
        .unwrap();
        let mut propagator = Propagator::new(model);
        let point = bindings(vec![("x", arr1(&[1.0]).into())]);
        let stdevs = bindings(vec![("x", 0.1.into())]);

        let err = propagator.propagate(&point, &stdevs, None).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::UndefinedDerivative { symbol } if symbol == "x"
        ));
    }
}
