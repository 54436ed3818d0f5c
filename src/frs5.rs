use log::debug;
use serde::Deserialize;

use crate::constants::Constants;
use crate::correction::gas_density;
use crate::expr::Expr;
use crate::model::{Inputs, Model, Role, Symbol};
use crate::standard::Standard;
use crate::units::Unit;
use crate::{Error, Result};

/// Calibration certificate data of the piston gauge.
///
/// Parameters are stated in base SI units; the paired `u_*` fields are the
/// standard uncertainties propagated alongside them.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Frs5Config {
    /// Operating gas, resolved against the constant table.
    pub gas: String,
    /// Effective piston area in m^2.
    pub effective_area: f64,
    pub u_effective_area: f64,
    /// Reference mass placed during the span calibration, in kg.
    pub calibration_mass: f64,
    pub u_calibration_mass: f64,
    /// Balance indication under the calibration mass, in kg.
    pub reading_at_calibration_mass: f64,
    /// Balance indication with the pan empty, in kg.
    pub reading_at_zero: f64,
    pub u_reading_scale: f64,
    /// Local acceleration of gravity at the piston, in m/s^2.
    pub local_gravity: f64,
    pub u_local_gravity: f64,
    /// Density of the piston material, in kg/m^3.
    pub piston_density: f64,
    /// Relative temperature coefficient of the effective area, in 1/K.
    pub temperature_coefficient: f64,
    pub u_temperature_coefficient: f64,
    /// Buoyancy correction of the balance reading, in kg.
    pub buoyancy_correction: f64,
    /// Remaining systematic reading correction, in kg.
    pub systematic_correction: f64,
    pub u_systematic_correction: f64,
}

impl Default for Frs5Config {
    fn default() -> Self {
        Self {
            gas: "N2".to_owned(),
            effective_area: 9.804_2e-4,
            u_effective_area: 1.5e-8,
            calibration_mass: 1.0,
            u_calibration_mass: 5e-7,
            reading_at_calibration_mass: 1.0,
            reading_at_zero: 0.0,
            u_reading_scale: 2e-7,
            local_gravity: 9.812_053,
            u_local_gravity: 1e-5,
            piston_density: 7_920.0,
            temperature_coefficient: 2.4e-5,
            u_temperature_coefficient: 1e-6,
            buoyancy_correction: 0.0,
            systematic_correction: 0.0,
            u_systematic_correction: 1e-7,
        }
    }
}

impl Frs5Config {
    /// Parse a configuration from its TOML representation.
    ///
    /// # Errors
    /// [`Error::Config`] when the document does not match the schema.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// The force reference standard: a gas-operated piston gauge whose pressure
/// is the piston force per effective area.
///
/// The balance span is anchored by the calibration mass; the raw reading is
/// corrected for zero-check drift, buoyancy and the remaining systematic
/// offset, then translated into pressure with the gravity, area, gas
/// buoyancy and thermal area corrections.
pub struct Frs5 {
    constants: Constants,
    config: Frs5Config,
}

impl Frs5 {
    pub const fn new(constants: Constants, config: Frs5Config) -> Self {
        Self { constants, config }
    }

    pub const fn config(&self) -> &Frs5Config {
        &self.config
    }

    /// The balance model
    ///
    /// ```text
    /// p = (r - (r_zc - r_zc0) + ub + usys) * m_cal / (r_cal - r_cal0)
    ///     * g / A * 1 / (1 - rho_gas / rho_piston)
    ///     * 1 / (1 + ab * (t - 20 C)) + p_res
    /// ```
    fn balance_expr() -> Expr {
        let sym = Expr::symbol;
        let corrected_reading = sym("reading")
            - (sym("reading_zero_check") - sym("reading_zero_check_initial"))
            + sym("buoyancy_correction")
            + sym("systematic_correction");
        let mass_scale = sym("calibration_mass")
            / (sym("reading_at_calibration_mass") - sym("reading_at_zero"));
        let buoyancy = Expr::pow(
            Expr::Const(1.0) - sym("gas_density") / sym("piston_density"),
            -1,
        );
        let thermal = Expr::pow(
            Expr::Const(1.0)
                + sym("temperature_coefficient")
                    * (sym("temperature_balance") - Expr::Const(20.0)),
            -1,
        );
        corrected_reading * mass_scale * sym("local_gravity")
            / sym("effective_area")
            * buoyancy
            * thermal
            + sym("pressure_residual")
    }

    fn symbols() -> Vec<Symbol> {
        vec![
            Symbol::new("reading", Unit::Kilogram, Role::Measured),
            Symbol::new("reading_zero_check", Unit::Kilogram, Role::Measured),
            Symbol::new("reading_zero_check_initial", Unit::Kilogram, Role::Measured),
            Symbol::new("temperature_balance", Unit::Celsius, Role::Measured),
            Symbol::new("pressure_residual", Unit::Pascal, Role::Measured),
            Symbol::new("effective_area", Unit::SquareMeter, Role::Parameter),
            Symbol::new("calibration_mass", Unit::Kilogram, Role::Parameter),
            Symbol::new("reading_at_calibration_mass", Unit::Kilogram, Role::Parameter),
            Symbol::new("reading_at_zero", Unit::Kilogram, Role::Parameter),
            Symbol::new("local_gravity", Unit::MeterPerSquareSecond, Role::Parameter),
            Symbol::new("piston_density", Unit::KilogramPerCubicMeter, Role::Constant),
            Symbol::new("gas_density", Unit::KilogramPerCubicMeter, Role::Parameter),
            Symbol::new("temperature_coefficient", Unit::PerKelvin, Role::Parameter),
            Symbol::new("buoyancy_correction", Unit::Kilogram, Role::Parameter),
            Symbol::new("systematic_correction", Unit::Kilogram, Role::Parameter),
        ]
    }

    /// The operating gas density from a first-pass pressure estimate.
    ///
    /// The buoyancy term is a per-mille effect, so the estimate ignores its
    /// own corrections: mean reading times the span scale, gravity and area.
    fn operating_gas_density(&self, inputs: &Inputs) -> Result<f64> {
        let reading = inputs
            .quantity("reading")
            .ok_or_else(|| Error::ModelDefinition {
                model: "FRS5".to_owned(),
                symbol: "reading".to_owned(),
            })?
            .convert_to(Unit::Kilogram)?;
        let mean_reading = reading.values().mean().unwrap_or(0.0);
        let span = self.config.calibration_mass
            / (self.config.reading_at_calibration_mass - self.config.reading_at_zero);
        let pressure_estimate = (mean_reading * span * self.config.local_gravity
            / self.config.effective_area)
            .max(0.0);

        let temperature = inputs
            .quantity("temperature_balance")
            .map_or(Ok::<f64, Error>(self.constants.reference_temperature), |q| {
                Ok(q.convert_to(Unit::Kelvin)?
                    .values()
                    .mean()
                    .unwrap_or(self.constants.reference_temperature))
            })?;

        gas_density(&self.constants, &self.config.gas, pressure_estimate, temperature)
    }
}

impl Standard for Frs5 {
    fn name(&self) -> &str {
        "FRS5"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        Model::new("FRS5", Self::balance_expr(), Self::symbols(), Unit::Pascal)
    }

    /// Inject the certificate parameters and the derived gas density.
    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        let rho_gas = self.operating_gas_density(inputs)?;
        debug!("FRS5 operating gas density {rho_gas:.6} kg/m^3");

        let c = &self.config;
        let mut prepared = inputs.clone();
        prepared.insert_parameter("effective_area", c.effective_area);
        prepared.insert_parameter("u_effective_area", c.u_effective_area);
        prepared.insert_parameter("calibration_mass", c.calibration_mass);
        prepared.insert_parameter("u_calibration_mass", c.u_calibration_mass);
        prepared.insert_parameter("reading_at_calibration_mass", c.reading_at_calibration_mass);
        prepared.insert_parameter("u_reading_at_calibration_mass", c.u_reading_scale);
        prepared.insert_parameter("reading_at_zero", c.reading_at_zero);
        prepared.insert_parameter("local_gravity", c.local_gravity);
        prepared.insert_parameter("u_local_gravity", c.u_local_gravity);
        prepared.insert_parameter("piston_density", c.piston_density);
        prepared.insert_parameter("gas_density", rho_gas);
        prepared.insert_parameter("temperature_coefficient", c.temperature_coefficient);
        prepared.insert_parameter("u_temperature_coefficient", c.u_temperature_coefficient);
        prepared.insert_parameter("buoyancy_correction", c.buoyancy_correction);
        prepared.insert_parameter("systematic_correction", c.systematic_correction);
        prepared.insert_parameter("u_systematic_correction", c.u_systematic_correction);
        Ok(prepared)
    }
}
