//! Customer-side transfer devices: the gauges a calibration compares
//! against the standards.

use std::f64::consts::PI;
use std::io;

use ndarray::Array1;
use serde::Deserialize;

use crate::constants::Constants;
use crate::expr::Expr;
use crate::model::{Inputs, Model, Role, Symbol};
use crate::standard::Standard;
use crate::units::Unit;
use crate::values::Quantity;
use crate::{Error, Result};

/// One band of a device's certificate uncertainty table.
///
/// The band applies where the pressure, expressed in `range_unit`, lies in
/// `[from, to]`. A value with unit `1` is relative to the pressure; any
/// other unit is an absolute contribution.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct UncertaintyRecord {
    pub from: f64,
    pub to: f64,
    pub range_unit: Unit,
    pub value: f64,
    pub unit: Unit,
}

/// Load certificate uncertainty bands from CSV with the columns
/// `from,to,range_unit,value,unit`.
///
/// # Errors
/// [`Error::Curve`] on malformed rows.
pub fn records_from_csv(reader: impl io::Read) -> Result<Vec<UncertaintyRecord>> {
    let mut records = Vec::new();
    for row in csv::Reader::from_reader(reader).deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// The certificate uncertainty of a device over a pressure series: per row,
/// the quadratic sum of every band covering that pressure, in `unit`.
///
/// # Errors
/// [`Error::UnitMismatch`] when a band's units cannot be expressed in the
/// requested unit.
pub fn total_uncertainty(
    records: &[UncertaintyRecord],
    pressure: &Quantity,
    unit: Unit,
) -> Result<Array1<f64>> {
    let target = pressure.convert_to(unit)?;
    let mut sum_sq = Array1::zeros(target.len());

    for record in records {
        let in_band = pressure.convert_to(record.range_unit)?;
        let absolute = if record.unit == Unit::One {
            None
        } else {
            // spread conversion: scale only, never the offset
            Some(record.unit.conversion_to(unit)?.apply_spread(record.value))
        };

        for row in 0..target.len() {
            let banded = in_band.values()[row];
            if banded < record.from || banded > record.to {
                continue;
            }
            let contribution =
                absolute.unwrap_or_else(|| record.value * target.values()[row]);
            sum_sq[row] += contribution * contribution;
        }
    }
    Ok(sum_sq.mapv(f64::sqrt))
}

/// The sensor head variant of a capacitance diaphragm gauge, named by its
/// nominal full scale.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum CdgTypehead {
    #[serde(rename = "0.001Torr")]
    Torr0_001,
    #[serde(rename = "0.01Torr")]
    Torr0_01,
    #[serde(rename = "0.1Torr")]
    Torr0_1,
    #[serde(rename = "1Torr")]
    Torr1,
    #[serde(rename = "10Torr")]
    Torr10,
    #[serde(rename = "100Torr")]
    Torr100,
    #[serde(rename = "1000Torr")]
    Torr1000,
}

impl CdgTypehead {
    /// Nominal full scale in mbar.
    pub const fn full_scale_mbar(self) -> f64 {
        match self {
            Self::Torr0_001 => 0.0013,
            Self::Torr0_01 => 0.0133,
            Self::Torr0_1 => 0.1333,
            Self::Torr1 => 1.3332,
            Self::Torr10 => 13.332,
            Self::Torr100 => 133.32,
            Self::Torr1000 => 1_333.2,
        }
    }
}

/// A capacitance diaphragm gauge with its calibration error curve.
///
/// The gauge is usable over three decades below its full scale; readings
/// outside that window carry no calibration claim and evaluate to NaN. The
/// error curve holds the relative indication error over pressure (mbar) and
/// is interpolated linearly between its support points.
pub struct Cdg {
    typehead: CdgTypehead,
    curve: Vec<(f64, f64)>,
    records: Vec<UncertaintyRecord>,
}

/// Decades of usable range below a head's full scale.
const CDG_USABLE_DECADES: i32 = 3;

#[derive(Debug, Deserialize)]
struct ErrorCurveRow {
    pressure: f64,
    relative_error: f64,
}

impl Cdg {
    pub const fn new(typehead: CdgTypehead) -> Self {
        Self {
            typehead,
            curve: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Attach an error curve of `(pressure mbar, relative error)` points.
    #[must_use]
    pub fn with_error_curve(mut self, mut curve: Vec<(f64, f64)>) -> Self {
        curve.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.curve = curve;
        self
    }

    #[must_use]
    pub fn with_uncertainty_records(mut self, records: Vec<UncertaintyRecord>) -> Self {
        self.records = records;
        self
    }

    /// Load the error curve from CSV with the columns
    /// `pressure,relative_error` (pressure in mbar).
    ///
    /// # Errors
    /// [`Error::Curve`] on malformed rows.
    pub fn with_error_curve_csv(self, reader: impl io::Read) -> Result<Self> {
        let mut curve = Vec::new();
        for row in csv::Reader::from_reader(reader).deserialize() {
            let row: ErrorCurveRow = row?;
            curve.push((row.pressure, row.relative_error));
        }
        Ok(self.with_error_curve(curve))
    }

    pub const fn typehead(&self) -> CdgTypehead {
        self.typehead
    }

    /// The usable pressure window in mbar.
    pub fn usable_range_mbar(&self) -> (f64, f64) {
        let full_scale = self.typehead.full_scale_mbar();
        (full_scale / 10f64.powi(CDG_USABLE_DECADES), full_scale)
    }

    /// The relative indication error at `pressure_mbar`.
    ///
    /// NaN outside the usable window; inside it the curve interpolates
    /// linearly and clamps at its outermost support points. Without a curve
    /// the gauge is taken as reading true.
    pub fn error_at(&self, pressure_mbar: f64) -> f64 {
        let (low, high) = self.usable_range_mbar();
        if pressure_mbar < low || pressure_mbar > high {
            return f64::NAN;
        }
        interpolate(&self.curve, pressure_mbar)
    }

    /// Certificate uncertainty bands applied over a pressure series.
    ///
    /// # Errors
    /// [`Error::UnitMismatch`] when a band's units cannot be expressed in
    /// the requested unit.
    pub fn device_uncertainty(&self, pressure: &Quantity, unit: Unit) -> Result<Array1<f64>> {
        total_uncertainty(&self.records, pressure, unit)
    }
}

impl Default for Cdg {
    fn default() -> Self {
        Self::new(CdgTypehead::Torr1000)
    }
}

fn interpolate(curve: &[(f64, f64)], x: f64) -> f64 {
    let Some((first, last)) = curve.first().zip(curve.last()) else {
        return 0.0;
    };
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    for pair in curve.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    last.1
}

impl Standard for Cdg {
    fn name(&self) -> &str {
        "CDG"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        let expr = Expr::symbol("pressure_indicated")
            * (Expr::Const(1.0) + Expr::symbol("error_correction"));
        Model::new(
            "CDG",
            expr,
            vec![
                Symbol::new("pressure_indicated", Unit::Pascal, Role::Measured),
                Symbol::new("error_correction", Unit::One, Role::Measured),
            ],
            Unit::Pascal,
        )
    }

    /// Interpolate the error curve at every indicated pressure and inject
    /// the result as the correction channel.
    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        let indicated = inputs
            .quantity("pressure_indicated")
            .ok_or_else(|| Error::ModelDefinition {
                model: "CDG".to_owned(),
                symbol: "pressure_indicated".to_owned(),
            })?
            .convert_to(Unit::Millibar)?;
        let errors = indicated.values().mapv(|p| self.error_at(p));

        Ok(inputs
            .clone()
            .with_quantity(Quantity::new("error_correction", errors, Unit::One)))
    }
}

/// Calibration data of a spinning rotor gauge's ball.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SrgConfig {
    /// Operating gas, resolved against the constant table.
    pub gas: String,
    /// Ball diameter in m.
    pub ball_diameter: f64,
    pub u_ball_diameter: f64,
    /// Ball density in kg/m^3.
    pub ball_density: f64,
    pub u_ball_density: f64,
    /// Effective tangential momentum accommodation coefficient.
    pub accommodation_coefficient: f64,
}

impl Default for SrgConfig {
    fn default() -> Self {
        Self {
            gas: "N2".to_owned(),
            ball_diameter: 4.5e-3,
            u_ball_diameter: 1e-6,
            ball_density: 7_715.0,
            u_ball_density: 5.0,
            accommodation_coefficient: 1.0,
        }
    }
}

/// A spinning rotor gauge: the relative decay rate of a levitated ball's
/// rotation is proportional to the molecular drag, hence to pressure.
///
/// ```text
/// p = dcr * K * sqrt(T / T_ref),   K = pi d rho c_mean / (20 sigma)
/// ```
///
/// with `c_mean` the mean thermal speed of the gas at the reference
/// temperature.
pub struct Srg {
    constants: Constants,
    config: SrgConfig,
}

impl Srg {
    pub fn new(constants: Constants) -> Self {
        Self::with_config(constants, SrgConfig::default())
    }

    pub const fn with_config(constants: Constants, config: SrgConfig) -> Self {
        Self { constants, config }
    }

    pub const fn config(&self) -> &SrgConfig {
        &self.config
    }

    /// Pressure per unit decay rate at the reference temperature, in Pa.
    ///
    /// # Errors
    /// [`Error::UnknownGas`] when the configured gas is not registered.
    pub fn calibration_factor(&self) -> Result<f64> {
        let molar_mass = self.constants.molar_mass(&self.config.gas)?;
        let mean_speed = (8.0 * self.constants.molar_gas_constant
            * self.constants.reference_temperature
            / (PI * molar_mass))
            .sqrt();
        Ok(
            PI * self.config.ball_diameter * self.config.ball_density * mean_speed
                / (20.0 * self.config.accommodation_coefficient),
        )
    }
}

impl Standard for Srg {
    fn name(&self) -> &str {
        "SRG"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        let reference_temperature = self.constants.reference_temperature;
        let expr = Expr::symbol("decay_rate")
            * Expr::symbol("calibration_factor")
            * Expr::sqrt(
                Expr::symbol("temperature") * Expr::Const(1.0 / reference_temperature),
            );
        Model::new(
            "SRG",
            expr,
            vec![
                Symbol::new("decay_rate", Unit::Dcr, Role::Measured),
                Symbol::new("temperature", Unit::Kelvin, Role::Measured),
                Symbol::new("calibration_factor", Unit::One, Role::Parameter),
            ],
            Unit::Pascal,
        )
    }

    /// Derive the calibration factor from the ball and gas data.
    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        let factor = self.calibration_factor()?;
        let c = &self.config;
        let relative_u = f64::hypot(
            c.u_ball_diameter / c.ball_diameter,
            c.u_ball_density / c.ball_density,
        );

        let mut prepared = inputs.clone();
        prepared.insert_parameter("calibration_factor", factor);
        prepared.insert_parameter("u_calibration_factor", factor * relative_u);
        Ok(prepared)
    }
}

/// Certificate uncertainty budget of the thermometry multimeter, in K.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmmConfig {
    /// Known indication offset, in K.
    pub offset: f64,
    pub u_resolution: f64,
    pub u_calibration: f64,
    pub u_drift: f64,
    pub u_linearity: f64,
    pub u_thermal_emf: f64,
    pub u_repeatability: f64,
}

impl Default for DmmConfig {
    fn default() -> Self {
        Self {
            offset: 0.0,
            u_resolution: 2.9e-3,
            u_calibration: 5e-3,
            u_drift: 2e-3,
            u_linearity: 1e-3,
            u_thermal_emf: 1.5e-3,
            u_repeatability: 1e-3,
        }
    }
}

/// The digital multimeter reading the vessel thermometers.
///
/// The model is a plain offset correction; the instrument's contribution is
/// the root sum of squares of its six certificate terms, attached to the
/// offset symbol.
#[derive(Default)]
pub struct Dmm {
    config: DmmConfig,
}

impl Dmm {
    pub const fn new(config: DmmConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &DmmConfig {
        &self.config
    }

    /// The combined instrument uncertainty in K.
    pub fn combined_budget(&self) -> f64 {
        let c = &self.config;
        [
            c.u_resolution,
            c.u_calibration,
            c.u_drift,
            c.u_linearity,
            c.u_thermal_emf,
            c.u_repeatability,
        ]
        .iter()
        .map(|u| u * u)
        .sum::<f64>()
        .sqrt()
    }
}

impl Standard for Dmm {
    fn name(&self) -> &str {
        "DMM"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        let expr = Expr::symbol("temperature_indicated") + Expr::symbol("offset");
        Model::new(
            "DMM",
            expr,
            vec![
                Symbol::new("temperature_indicated", Unit::Kelvin, Role::Measured),
                Symbol::new("offset", Unit::Kelvin, Role::Parameter),
            ],
            Unit::Kelvin,
        )
    }

    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        let mut prepared = inputs.clone();
        prepared.insert_parameter("offset", self.config.offset);
        prepared.insert_parameter("u_offset", self.combined_budget());
        Ok(prepared)
    }
}

/// A quartz Bourdon spirometer-type reference sensor.
///
/// The certificate states the indication error as a polynomial in the
/// indicated pressure, in percent; the model applies it as
/// `p = p_ind * (1 + e(p_ind) / 100)`. Keeping the polynomial symbolic lets
/// the propagation differentiate straight through it.
pub struct Qbs {
    /// Error polynomial coefficients in percent, constant term first,
    /// over the indicated pressure in Pa.
    coefficients: Vec<f64>,
}

impl Qbs {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    fn error_polynomial(&self) -> Expr {
        let terms = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(k, c)| {
                Expr::Const(*c)
                    * Expr::pow(
                        Expr::symbol("pressure_indicated"),
                        i32::try_from(k).unwrap_or(i32::MAX),
                    )
            })
            .collect();
        Expr::sum(terms)
    }
}

impl Default for Qbs {
    fn default() -> Self {
        Self::new(vec![0.0])
    }
}

impl Standard for Qbs {
    fn name(&self) -> &str {
        "QBS"
    }

    fn define_model(&self, _inputs: &Inputs) -> Result<Model> {
        let expr = Expr::symbol("pressure_indicated")
            * (Expr::Const(1.0) + self.error_polynomial() * Expr::Const(0.01));
        Model::new(
            "QBS",
            expr,
            vec![Symbol::new("pressure_indicated", Unit::Pascal, Role::Measured)],
            Unit::Pascal,
        )
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::{
        records_from_csv, total_uncertainty, Cdg, CdgTypehead, Dmm, Qbs, Srg, SrgConfig,
        UncertaintyRecord,
    };
    use crate::constants::Constants;
    use crate::model::Inputs;
    use crate::standard::Standard;
    use crate::units::Unit;
    use crate::values::Quantity;

    #[test]
    fn typehead_full_scales_follow_the_torr_ladder() {
        approx::assert_relative_eq!(CdgTypehead::Torr1.full_scale_mbar(), 1.3332);
        approx::assert_relative_eq!(CdgTypehead::Torr1000.full_scale_mbar(), 1_333.2);
    }

    #[test]
    fn cdg_error_interpolates_between_support_points() {
        let cdg = Cdg::new(CdgTypehead::Torr10)
            .with_error_curve(vec![(1.0, 0.010), (10.0, 0.020)]);
        approx::assert_relative_eq!(cdg.error_at(1.0), 0.010);
        approx::assert_relative_eq!(cdg.error_at(5.5), 0.015);
        // clamped at the outermost support point inside the usable window
        approx::assert_relative_eq!(cdg.error_at(12.0), 0.020);
    }

    #[test]
    fn cdg_reading_outside_three_decades_is_nan() {
        let cdg = Cdg::new(CdgTypehead::Torr10).with_error_curve(vec![(1.0, 0.01)]);
        let (low, high) = cdg.usable_range_mbar();
        approx::assert_relative_eq!(low, 0.013_332);
        assert!(cdg.error_at(low / 2.0).is_nan());
        assert!(cdg.error_at(high * 1.5).is_nan());
        assert!(!cdg.error_at(low).is_nan());
    }

    #[test]
    fn cdg_applies_the_interpolated_correction() {
        let cdg = Cdg::new(CdgTypehead::Torr1000)
            .with_error_curve(vec![(10.0, 0.010), (100.0, 0.010)]);
        let inputs = Inputs::new().with_quantity(Quantity::new(
            "pressure_indicated",
            arr1(&[50.0]),
            Unit::Millibar,
        ));
        let p = cdg.evaluate(&inputs).unwrap();
        approx::assert_relative_eq!(p[0], 5_000.0 * 1.01, max_relative = 1e-12);
    }

    #[test]
    fn cdg_error_curve_loads_from_csv() {
        let raw = "pressure,relative_error\n1.0,0.010\n10.0,0.020\n";
        let cdg = Cdg::new(CdgTypehead::Torr10)
            .with_error_curve_csv(raw.as_bytes())
            .unwrap();
        approx::assert_relative_eq!(cdg.error_at(5.5), 0.015);
    }

    #[test]
    fn srg_pressure_is_linear_in_the_decay_rate() {
        let constants = Constants::vacuum_defaults();
        let srg = Srg::new(constants.clone());
        let k = srg.calibration_factor().unwrap();

        let c = SrgConfig::default();
        let mean_speed = (8.0 * constants.molar_gas_constant * constants.reference_temperature
            / (std::f64::consts::PI * constants.molar_mass("N2").unwrap()))
        .sqrt();
        approx::assert_relative_eq!(
            k,
            std::f64::consts::PI * c.ball_diameter * c.ball_density * mean_speed / 20.0,
            max_relative = 1e-12
        );

        let inputs = Inputs::new()
            .with_quantity(Quantity::new(
                "decay_rate",
                arr1(&[1e-6, 2e-6]),
                Unit::Dcr,
            ))
            .with_quantity(Quantity::new(
                "temperature",
                arr1(&[296.15, 296.15]),
                Unit::Kelvin,
            ));
        let p = srg.evaluate(&inputs).unwrap();
        approx::assert_relative_eq!(p[0], k * 1e-6, max_relative = 1e-12);
        approx::assert_relative_eq!(p[1], 2.0 * p[0], max_relative = 1e-12);
    }

    #[test]
    fn srg_temperature_enters_as_a_square_root() {
        let srg = Srg::new(Constants::vacuum_defaults());
        let at = |t: f64| {
            let inputs = Inputs::new()
                .with_quantity(Quantity::new("decay_rate", arr1(&[1e-6]), Unit::Dcr))
                .with_quantity(Quantity::new("temperature", arr1(&[t]), Unit::Kelvin));
            srg.evaluate(&inputs).unwrap()[0]
        };
        approx::assert_relative_eq!(
            at(4.0 * 296.15) / at(296.15),
            2.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn dmm_budget_is_the_root_sum_of_squares_of_six_terms() {
        let dmm = Dmm::default();
        let c = dmm.config();
        let expected = (c.u_resolution.powi(2)
            + c.u_calibration.powi(2)
            + c.u_drift.powi(2)
            + c.u_linearity.powi(2)
            + c.u_thermal_emf.powi(2)
            + c.u_repeatability.powi(2))
        .sqrt();
        approx::assert_relative_eq!(dmm.combined_budget(), expected);

        let inputs = Inputs::new().with_quantity(Quantity::new(
            "temperature_indicated",
            arr1(&[23.0]),
            Unit::Celsius,
        ));
        let t = dmm.evaluate(&inputs).unwrap();
        approx::assert_relative_eq!(t[0], 296.15);

        let u = dmm.evaluate_uncertainty(&inputs).unwrap();
        approx::assert_relative_eq!(u.total[0], expected, max_relative = 1e-12);
    }

    #[test]
    fn qbs_applies_its_percent_error_polynomial() {
        // constant +1 % error
        let qbs = Qbs::new(vec![1.0]);
        let inputs = Inputs::new().with_quantity(Quantity::new(
            "pressure_indicated",
            arr1(&[1_000.0]),
            Unit::Pascal,
        ));
        let p = qbs.evaluate(&inputs).unwrap();
        approx::assert_relative_eq!(p[0], 1_010.0, max_relative = 1e-12);

        // a linear term grows with the indication
        let qbs = Qbs::new(vec![0.0, 1e-3]);
        let p = qbs.evaluate(&inputs).unwrap();
        approx::assert_relative_eq!(p[0], 1_000.0 * 1.01, max_relative = 1e-12);
    }

    #[test]
    fn banded_uncertainty_sums_applicable_records_quadratically() {
        let records = vec![
            UncertaintyRecord {
                from: 0.0,
                to: 100.0,
                range_unit: Unit::Millibar,
                value: 3e-4,
                unit: Unit::One,
            },
            UncertaintyRecord {
                from: 0.0,
                to: 10.0,
                range_unit: Unit::Millibar,
                value: 0.4,
                unit: Unit::Pascal,
            },
        ];
        let pressure = Quantity::new("p", arr1(&[5.0, 50.0]), Unit::Millibar);
        let u = total_uncertainty(&records, &pressure, Unit::Pascal).unwrap();

        // 5 mbar = 500 Pa: both bands apply
        approx::assert_relative_eq!(
            u[0],
            (0.15f64.powi(2) + 0.4f64.powi(2)).sqrt(),
            max_relative = 1e-12
        );
        // 50 mbar: only the relative band applies
        approx::assert_relative_eq!(u[1], 1.5, max_relative = 1e-12);
    }

    #[test]
    fn uncertainty_records_load_from_csv() {
        let raw = "from,to,range_unit,value,unit\n0.0,100.0,mbar,3e-4,1\n";
        let records = records_from_csv(raw.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].range_unit, Unit::Millibar);
        assert_eq!(records[0].unit, Unit::One);
    }
}
