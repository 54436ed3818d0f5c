use ndarray::Array1;

use crate::expr::Expr;
use crate::model::{Inputs, Model, Role, Symbol};
use crate::standard::Standard;
use crate::units::Unit;
use crate::Result;

/// A maintained group of transfer gauges acting as one reference.
///
/// The group pressure is the weighted mean of the member pressures; each
/// member enters as its own measured channel, named after the member, so the
/// uncertainty breakdown names the gauge that carries each share.
pub struct GroupNormal {
    members: Vec<(String, f64)>,
}

impl GroupNormal {
    /// A group over named members with their weights. Weights need not be
    /// normalised; the model divides by their sum.
    pub fn new(members: Vec<(String, f64)>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }
}

impl Default for GroupNormal {
    /// Three equally weighted gauges, the usual maintenance configuration.
    fn default() -> Self {
        Self::new(
            (1..=3)
                .map(|i| (format!("cdg_{i}"), 1.0))
                .collect(),
        )
    }
}

impl Standard for GroupNormal {
    fn name(&self) -> &str {
        "GROUP_NORMAL"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        let weight_sum: f64 = self.members.iter().map(|(_, w)| w).sum();
        let weighted = self
            .members
            .iter()
            .map(|(name, weight)| Expr::Const(*weight) * Expr::symbol(name.clone()))
            .collect();
        let expr = Expr::sum(weighted) / Expr::Const(weight_sum);

        let symbols = self
            .members
            .iter()
            .map(|(name, _)| Symbol::new(name.clone(), Unit::Pascal, Role::Measured))
            .collect();
        Model::new("GROUP_NORMAL", expr, symbols, Unit::Pascal)
    }
}

/// Combine member uncertainties the way the group's long-term record keeps
/// them: the reciprocal of the summed reciprocals, `u_c = (sum 1/u_i)^-1`.
///
/// All arrays must be aligned; entries where any member reports a zero
/// uncertainty yield zero.
pub fn harmonic_combination(uncertainties: &[Array1<f64>]) -> Array1<f64> {
    let rows = uncertainties.first().map_or(0, Array1::len);
    let mut reciprocal_sum = Array1::<f64>::zeros(rows);
    for u in uncertainties {
        reciprocal_sum = reciprocal_sum + u.mapv(|x| 1.0 / x);
    }
    reciprocal_sum.mapv(|x| 1.0 / x)
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::{harmonic_combination, GroupNormal};
    use crate::model::Inputs;
    use crate::standard::Standard;
    use crate::units::Unit;
    use crate::values::Quantity;
    use crate::Error;

    fn member_inputs() -> Inputs {
        Inputs::new()
            .with_quantity(
                Quantity::new("cdg_1", arr1(&[100.0, 200.0]), Unit::Pascal)
                    .with_stdev(arr1(&[0.3, 0.3]))
                    .unwrap(),
            )
            .with_quantity(
                Quantity::new("cdg_2", arr1(&[101.0, 201.0]), Unit::Pascal)
                    .with_stdev(arr1(&[0.4, 0.4]))
                    .unwrap(),
            )
            .with_quantity(
                Quantity::new("cdg_3", arr1(&[99.0, 199.0]), Unit::Pascal)
                    .with_stdev(arr1(&[0.5, 0.5]))
                    .unwrap(),
            )
    }

    #[test]
    fn equal_weights_give_the_plain_mean() {
        let group = GroupNormal::default();
        let p = group.evaluate(&member_inputs()).unwrap();
        approx::assert_relative_eq!(p[0], 100.0, max_relative = 1e-12);
        approx::assert_relative_eq!(p[1], 200.0, max_relative = 1e-12);
    }

    #[test]
    fn weights_shift_the_mean_towards_the_heavier_member() {
        let group = GroupNormal::new(vec![
            ("cdg_1".to_owned(), 2.0),
            ("cdg_2".to_owned(), 1.0),
            ("cdg_3".to_owned(), 1.0),
        ]);
        let p = group.evaluate(&member_inputs()).unwrap();
        // (2 * 100 + 101 + 99) / 4
        approx::assert_relative_eq!(p[0], 100.0, max_relative = 1e-12);

        let group = GroupNormal::new(vec![
            ("cdg_1".to_owned(), 0.0),
            ("cdg_2".to_owned(), 1.0),
            ("cdg_3".to_owned(), 1.0),
        ]);
        let p = group.evaluate(&member_inputs()).unwrap();
        approx::assert_relative_eq!(p[0], 100.0, max_relative = 1e-12);
        approx::assert_relative_eq!(p[1], 200.0, max_relative = 1e-12);
    }

    #[test]
    fn member_stdevs_combine_scaled_by_their_weights() {
        let group = GroupNormal::default();
        let result = group.evaluate_uncertainty(&member_inputs()).unwrap();

        // each partial is 1/3, so u = sqrt(0.3^2 + 0.4^2 + 0.5^2) / 3
        let expected = (0.09f64 + 0.16 + 0.25).sqrt() / 3.0;
        approx::assert_relative_eq!(result.total[0], expected, max_relative = 1e-12);
        assert_eq!(result.contributions.len(), 3);
        assert_eq!(result.contributions[0].symbol, "cdg_1");
    }

    #[test]
    fn missing_member_channel_is_a_model_definition_error() {
        let group = GroupNormal::default();
        let partial = Inputs::new().with_quantity(Quantity::new(
            "cdg_1",
            arr1(&[100.0]),
            Unit::Pascal,
        ));
        let err = group.evaluate(&partial).unwrap_err();
        assert!(matches!(err, Error::ModelDefinition { symbol, .. } if symbol == "cdg_2"));
    }

    #[test]
    fn harmonic_combination_matches_the_two_member_formula() {
        let u = harmonic_combination(&[arr1(&[0.2, 0.5]), arr1(&[0.3, 0.5])]);
        // (1/0.2 + 1/0.3)^-1 = 0.12
        approx::assert_relative_eq!(u[0], 0.12, max_relative = 1e-12);
        approx::assert_relative_eq!(u[1], 0.25, max_relative = 1e-12);
    }
}
