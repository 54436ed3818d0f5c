use log::debug;
use ndarray::arr1;
use serde::Deserialize;

use crate::constants::Constants;
use crate::correction::{real_gas_correction, thermal_expansion};
use crate::expr::Expr;
use crate::model::{Inputs, Model, Role, Symbol};
use crate::standard::Standard;
use crate::units::Unit;
use crate::{Error, Result};

/// Geometry and certificate data of one static expansion stage.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Operating gas, resolved against the constant table.
    pub gas: String,
    /// Nominal expansion ratio of the stage (small over total volume).
    pub expansion_ratio: f64,
    pub u_expansion_ratio: f64,
    /// Starting volume the fill pressure is established in, in m^3.
    pub start_volume: f64,
    pub u_start_volume: f64,
    /// Additional dead volume connected during expansion, in m^3.
    pub additional_volume: f64,
    pub u_additional_volume: f64,
    /// Volumetric thermal expansion coefficient of the vessel, in 1/K.
    pub volume_expansion_coefficient: f64,
}

impl ExpansionConfig {
    /// Parse a configuration from its TOML representation.
    ///
    /// # Errors
    /// [`Error::Config`] when the document does not match the schema.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// A static expansion standard: a known fill pressure expanded through a
/// calibrated volume ratio.
///
/// SE2 and SE3 share the model and differ only in geometry, so one type
/// serves both registry entries:
///
/// ```text
/// p = p_fill * 1 / (1 / f + V_add / V_start) * T_after / T_before * rg
/// ```
///
/// with `f` the calibrated expansion ratio, `V_add` the connected dead
/// volume, the temperature ratio correcting for non-isothermal expansion and
/// `rg` the real-gas factor of the fill gas.
pub struct ExpansionStandard {
    name: &'static str,
    constants: Constants,
    config: ExpansionConfig,
}

impl ExpansionStandard {
    pub const fn new(
        name: &'static str,
        constants: Constants,
        config: ExpansionConfig,
    ) -> Self {
        Self {
            name,
            constants,
            config,
        }
    }

    /// The two-stage expansion apparatus for the medium vacuum range.
    pub fn se2(constants: Constants) -> Self {
        Self::new(
            "SE2",
            constants,
            ExpansionConfig {
                gas: "N2".to_owned(),
                expansion_ratio: 0.010_13,
                u_expansion_ratio: 2.5e-6,
                start_volume: 0.017,
                u_start_volume: 5e-6,
                additional_volume: 1.2e-5,
                u_additional_volume: 2e-7,
                volume_expansion_coefficient: 4.8e-5,
            },
        )
    }

    /// The large-vessel expansion apparatus for the fine vacuum range.
    pub fn se3(constants: Constants) -> Self {
        Self::new(
            "SE3",
            constants,
            ExpansionConfig {
                gas: "N2".to_owned(),
                expansion_ratio: 0.010_52,
                u_expansion_ratio: 1.6e-6,
                start_volume: 0.233,
                u_start_volume: 4e-5,
                additional_volume: 5.3e-5,
                u_additional_volume: 8e-7,
                volume_expansion_coefficient: 4.8e-5,
            },
        )
    }

    pub const fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    fn expansion_expr() -> Expr {
        let sym = Expr::symbol;
        let dilution = Expr::pow(
            Expr::pow(sym("expansion_ratio"), -1)
                + sym("additional_volume") / sym("start_volume"),
            -1,
        );
        sym("pressure_fill") * dilution * sym("temperature_after")
            / sym("temperature_before")
            * sym("real_gas_factor")
    }

    fn symbols() -> Vec<Symbol> {
        vec![
            Symbol::new("pressure_fill", Unit::Pascal, Role::Measured),
            Symbol::new("temperature_before", Unit::Kelvin, Role::Measured),
            Symbol::new("temperature_after", Unit::Kelvin, Role::Measured),
            Symbol::new("expansion_ratio", Unit::One, Role::Parameter),
            Symbol::new("start_volume", Unit::CubicMeter, Role::Parameter),
            Symbol::new("additional_volume", Unit::CubicMeter, Role::Parameter),
            Symbol::new("real_gas_factor", Unit::One, Role::Constant),
        ]
    }

    fn mean_in(&self, inputs: &Inputs, channel: &str, unit: Unit) -> Result<Option<f64>> {
        inputs
            .quantity(channel)
            .map(|q| -> Result<f64> {
                Ok(q.convert_to(unit)?.values().mean().unwrap_or(f64::NAN))
            })
            .transpose()
    }
}

impl Standard for ExpansionStandard {
    fn name(&self) -> &str {
        self.name
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        Model::new(self.name, Self::expansion_expr(), Self::symbols(), Unit::Pascal)
    }

    /// Inject the stage geometry, the thermally corrected start volume and
    /// the real-gas factor of the fill state.
    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        let c = &self.config;

        // vessel temperature drives the thermal correction of the calibrated
        // start volume; without the channel the volume is used as certified
        let start_volume = match self.mean_in(inputs, "temperature_vessel", Unit::Kelvin)? {
            Some(vessel) => thermal_expansion(
                c.start_volume,
                c.volume_expansion_coefficient,
                self.constants.reference_temperature,
                vessel,
            ),
            None => c.start_volume,
        };
        let additional_volume = match self.mean_in(inputs, "temperature_room", Unit::Kelvin)? {
            Some(room) => thermal_expansion(
                c.additional_volume,
                c.volume_expansion_coefficient,
                self.constants.reference_temperature,
                room,
            ),
            None => c.additional_volume,
        };

        let fill_pressure = self
            .mean_in(inputs, "pressure_fill", Unit::Pascal)?
            .ok_or_else(|| Error::ModelDefinition {
                model: self.name.to_owned(),
                symbol: "pressure_fill".to_owned(),
            })?;
        let fill_temperature = self
            .mean_in(inputs, "temperature_before", Unit::Kelvin)?
            .unwrap_or(self.constants.reference_temperature);
        let rg = real_gas_correction(
            &self.constants,
            &c.gas,
            &arr1(&[fill_pressure]),
            fill_temperature,
        )?[0];
        debug!(
            "{} start volume {start_volume:.6e} m^3, real-gas factor {rg:.9}",
            self.name
        );

        let mut prepared = inputs.clone();
        prepared.insert_parameter("expansion_ratio", c.expansion_ratio);
        prepared.insert_parameter("u_expansion_ratio", c.u_expansion_ratio);
        prepared.insert_parameter("start_volume", start_volume);
        prepared.insert_parameter("u_start_volume", c.u_start_volume);
        prepared.insert_parameter("additional_volume", additional_volume);
        prepared.insert_parameter("u_additional_volume", c.u_additional_volume);
        prepared.insert_parameter("real_gas_factor", rg);
        Ok(prepared)
    }
}

/// The additional volume connected during an expansion, deduced from the
/// pressure drop it causes: `V_add = V_start / (p_before / p_after - 1)`.
pub fn additional_volume_from_pressure_drop(
    start_volume: f64,
    pressure_before: f64,
    pressure_after: f64,
) -> f64 {
    start_volume / (pressure_before / pressure_after - 1.0)
}
