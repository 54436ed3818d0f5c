use ndarray::Array1;

use crate::constants::Constants;
use crate::Result;

/// Real-gas compressibility correction for an already calculated pressure.
///
/// `rg = 1 / (1 + p B / (R T))` with the pressure in Pa, the temperature in
/// K and the gas's second virial coefficient from the constant table. The
/// factor multiplies an ideal-gas pressure to account for gas non-ideality.
///
/// # Errors
/// [`crate::Error::UnknownGas`] when `gas` is not registered.
pub fn real_gas_correction(
    constants: &Constants,
    gas: &str,
    pressure_pa: &Array1<f64>,
    temperature_k: f64,
) -> Result<Array1<f64>> {
    let b = constants.virial_coefficient(gas)?;
    let rt = constants.molar_gas_constant * temperature_k;
    Ok(pressure_pa.mapv(|p| 1.0 / (1.0 + p * b / rt)))
}

/// Ideal-gas density `rho = p M / (R T)` in kg/m^3, for the buoyancy
/// correction of the piston gauge.
///
/// # Errors
/// [`crate::Error::UnknownGas`] when `gas` is not registered.
pub fn gas_density(
    constants: &Constants,
    gas: &str,
    pressure_pa: f64,
    temperature_k: f64,
) -> Result<f64> {
    let molar_mass = constants.molar_mass(gas)?;
    Ok(pressure_pa * molar_mass / (constants.molar_gas_constant * temperature_k))
}

/// Linear thermal expansion of a volume between a stated before and after
/// temperature: `V' = V (1 + alpha (t_after - t_before))`.
pub fn thermal_expansion(
    volume: f64,
    expansion_coefficient: f64,
    temperature_before_k: f64,
    temperature_after_k: f64,
) -> f64 {
    volume * (1.0 + expansion_coefficient * (temperature_after_k - temperature_before_k))
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::{gas_density, real_gas_correction, thermal_expansion};
    use crate::constants::Constants;
    use crate::Error;

    #[test]
    fn real_gas_correction_is_unity_at_zero_pressure() {
        let constants = Constants::vacuum_defaults();
        let rg = real_gas_correction(&constants, "N2", &arr1(&[0.0, 1e5]), 293.15).unwrap();
        approx::assert_relative_eq!(rg[0], 1.0);
        // N2 has a negative virial coefficient, so rg > 1 at finite pressure
        assert!(rg[1] > 1.0);
        approx::assert_relative_eq!(
            rg[1],
            1.0 / (1.0 - 1e5 * 4.8e-6 / (8.314_462_618 * 293.15)),
            max_relative = 1e-12
        );
    }

    #[test]
    fn nitrogen_density_at_ambient_conditions() {
        let constants = Constants::vacuum_defaults();
        let rho = gas_density(&constants, "N2", 101_325.0, 293.15).unwrap();
        // textbook value ~1.165 kg/m^3
        approx::assert_relative_eq!(rho, 1.165, max_relative = 1e-3);
    }

    #[test]
    fn unknown_gas_propagates() {
        let constants = Constants::vacuum_defaults();
        let err = gas_density(&constants, "CO2", 1e5, 293.15).unwrap_err();
        assert!(matches!(err, Error::UnknownGas(_)));
    }

    #[test]
    fn thermal_expansion_is_linear_in_the_temperature_difference() {
        let v = thermal_expansion(1000.0, 1e-5, 293.15, 303.15);
        approx::assert_relative_eq!(v, 1000.1);
        // no temperature difference, no correction
        approx::assert_relative_eq!(thermal_expansion(1000.0, 1e-5, 293.15, 293.15), 1000.0);
    }
}
