use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reference properties of one calibration gas.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GasProperties {
    /// Molar mass in kg/mol.
    pub molar_mass: f64,
    /// Second virial coefficient in cm^3/mol near room temperature.
    pub virial_coefficient: f64,
}

/// The process-wide read-only constant table.
///
/// Populated once before the first evaluation and injected into every
/// component that needs it — never a hidden global. Loadable from TOML the
/// same way sensor data files are, with built-in defaults covering the gases
/// the standards are operated with.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Constants {
    /// Molar gas constant in Pa m^3/mol/K.
    pub molar_gas_constant: f64,
    /// Reference temperature of the laboratory in K.
    pub reference_temperature: f64,
    gases: BTreeMap<String, GasProperties>,
}

impl Constants {
    /// The built-in table for the gases the vacuum standards are run with.
    ///
    /// Virial coefficients are room-temperature values; override via
    /// [`Constants::from_toml`] when a calibration demands others.
    pub fn vacuum_defaults() -> Self {
        let gases = [
            ("N2", 28.013e-3, -4.8),
            ("Ar", 39.948e-3, -15.8),
            ("He", 4.002_6e-3, 11.8),
            ("H2", 2.016e-3, 14.1),
            ("Ne", 20.179_7e-3, 11.4),
            ("Kr", 83.798e-3, -51.1),
            ("Xe", 131.293e-3, -130.1),
        ]
        .into_iter()
        .map(|(name, molar_mass, virial_coefficient)| {
            (
                name.to_owned(),
                GasProperties {
                    molar_mass,
                    virial_coefficient,
                },
            )
        })
        .collect();

        Self {
            molar_gas_constant: 8.314_462_618,
            reference_temperature: 296.15,
            gases,
        }
    }

    /// Parse a constant table from its TOML representation.
    ///
    /// # Errors
    /// [`Error::Config`] when the document does not match the schema.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let constants: Self = toml::from_str(raw)?;
        debug!("constant table loaded with {} gases", constants.gases.len());
        Ok(constants)
    }

    /// # Errors
    /// [`Error::UnknownGas`] when `gas` is not registered.
    pub fn gas(&self, gas: &str) -> Result<&GasProperties> {
        self.gases
            .get(gas)
            .ok_or_else(|| Error::UnknownGas(gas.to_owned()))
    }

    /// Molar mass in kg/mol.
    ///
    /// # Errors
    /// [`Error::UnknownGas`] when `gas` is not registered.
    pub fn molar_mass(&self, gas: &str) -> Result<f64> {
        Ok(self.gas(gas)?.molar_mass)
    }

    /// Second virial coefficient in m^3/mol.
    ///
    /// # Errors
    /// [`Error::UnknownGas`] when `gas` is not registered.
    pub fn virial_coefficient(&self, gas: &str) -> Result<f64> {
        // table keeps cm^3/mol, the customary literature unit
        Ok(self.gas(gas)?.virial_coefficient * 1e-6)
    }
}

#[cfg(test)]
mod tests {
    use super::Constants;
    use crate::Error;

    #[test]
    fn defaults_cover_the_operating_gases() {
        let constants = Constants::vacuum_defaults();
        for gas in ["N2", "Ar", "He", "H2", "Ne", "Kr", "Xe"] {
            assert!(constants.gas(gas).is_ok(), "missing gas {gas}");
        }
        approx::assert_relative_eq!(constants.molar_mass("N2").unwrap(), 28.013e-3);
    }

    #[test]
    fn unknown_gas_lookup_fails() {
        let constants = Constants::vacuum_defaults();
        let err = constants.gas("SF6").unwrap_err();
        assert!(matches!(err, Error::UnknownGas(name) if name == "SF6"));
    }

    #[test]
    fn table_round_trips_through_toml() {
        let constants = Constants::vacuum_defaults();
        let raw = toml::to_string(&constants).unwrap();
        let reloaded = Constants::from_toml(&raw).unwrap();

        approx::assert_relative_eq!(
            reloaded.reference_temperature,
            constants.reference_temperature
        );
        approx::assert_relative_eq!(
            reloaded.virial_coefficient("Ar").unwrap(),
            constants.virial_coefficient("Ar").unwrap()
        );
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Constants::from_toml("molar_gas_constant = \"eight\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
