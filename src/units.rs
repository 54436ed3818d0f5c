use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The fixed unit vocabulary of the measurement channels.
///
/// Conversions are deterministic table lookups: a unit converts to any other
/// unit of the same dimension through a fixed factor (plus an offset for the
/// Celsius/Kelvin pair) and to nothing else. There is no runtime
/// registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "Pa")]
    Pascal,
    #[serde(rename = "mbar")]
    Millibar,
    #[serde(rename = "Torr")]
    Torr,
    #[serde(rename = "K")]
    Kelvin,
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "m^3")]
    CubicMeter,
    #[serde(rename = "cm^3")]
    CubicCentimeter,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "g")]
    Gram,
    /// Reading unit of the FRS5 balance.
    #[serde(rename = "lb")]
    Pound,
    #[serde(rename = "m^2")]
    SquareMeter,
    #[serde(rename = "cm^2")]
    SquareCentimeter,
    #[serde(rename = "kg/m^3")]
    KilogramPerCubicMeter,
    #[serde(rename = "g/cm^3")]
    GramPerCubicCentimeter,
    #[serde(rename = "m/s^2")]
    MeterPerSquareSecond,
    #[serde(rename = "ms")]
    Millisecond,
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "1/K")]
    PerKelvin,
    #[serde(rename = "kg/mol")]
    KilogramPerMol,
    /// Drag-coefficient-ratio reading of a spinning-rotor gauge.
    #[serde(rename = "DCR")]
    Dcr,
    #[serde(rename = "N")]
    Newton,
    #[serde(rename = "1")]
    One,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dimension {
    Pressure,
    Temperature,
    Volume,
    Mass,
    Area,
    Density,
    Acceleration,
    Time,
    ExpansionCoefficient,
    MolarMass,
    DragCoefficientRatio,
    Force,
    Dimensionless,
}

/// An affine conversion `x * scale + offset`.
///
/// Every pair of convertible units is linear except Celsius/Kelvin, which
/// carries an offset. Standard deviations scale but never shift, hence the
/// two application methods.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conversion {
    scale: f64,
    offset: f64,
}

impl Conversion {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    /// Apply to a spread rather than a point: the offset drops out.
    pub fn apply_spread(&self, value: f64) -> f64 {
        value * self.scale
    }

    pub const fn scale(&self) -> f64 {
        self.scale
    }
}

impl Unit {
    const fn dimension(self) -> Dimension {
        match self {
            Self::Pascal | Self::Millibar | Self::Torr => Dimension::Pressure,
            Self::Kelvin | Self::Celsius => Dimension::Temperature,
            Self::CubicMeter | Self::CubicCentimeter => Dimension::Volume,
            Self::Kilogram | Self::Gram | Self::Pound => Dimension::Mass,
            Self::SquareMeter | Self::SquareCentimeter => Dimension::Area,
            Self::KilogramPerCubicMeter | Self::GramPerCubicCentimeter => Dimension::Density,
            Self::MeterPerSquareSecond => Dimension::Acceleration,
            Self::Millisecond | Self::Second => Dimension::Time,
            Self::PerKelvin => Dimension::ExpansionCoefficient,
            Self::KilogramPerMol => Dimension::MolarMass,
            Self::Dcr => Dimension::DragCoefficientRatio,
            Self::Newton => Dimension::Force,
            Self::One => Dimension::Dimensionless,
        }
    }

    /// Factor and offset taking a value in `self` to the dimension's base
    /// unit (Pa, K, m^3, kg, m^2, kg/m^3, s, ...).
    const fn to_base(self) -> Conversion {
        let (scale, offset) = match self {
            Self::Pascal
            | Self::Kelvin
            | Self::CubicMeter
            | Self::Kilogram
            | Self::SquareMeter
            | Self::KilogramPerCubicMeter
            | Self::MeterPerSquareSecond
            | Self::Second
            | Self::PerKelvin
            | Self::KilogramPerMol
            | Self::Dcr
            | Self::Newton
            | Self::One => (1.0, 0.0),
            Self::Millibar => (100.0, 0.0),
            Self::Torr => (133.322, 0.0),
            Self::Celsius => (1.0, 273.15),
            Self::CubicCentimeter => (1e-6, 0.0),
            Self::Gram => (1e-3, 0.0),
            Self::Pound => (0.453_592_37, 0.0),
            Self::SquareCentimeter => (1e-4, 0.0),
            Self::GramPerCubicCentimeter => (1e3, 0.0),
            Self::Millisecond => (1e-3, 0.0),
        };
        Conversion { scale, offset }
    }

    /// The conversion taking values in `self` to values in `to`.
    ///
    /// # Errors
    /// Returns [`Error::UnitMismatch`] when the units belong to different
    /// dimensions.
    pub fn conversion_to(self, to: Self) -> Result<Conversion> {
        if self.dimension() != to.dimension() {
            return Err(Error::UnitMismatch { from: self, to });
        }
        let f = self.to_base();
        let t = to.to_base();
        // x_to = (x_from * f.scale + f.offset - t.offset) / t.scale
        Ok(Conversion {
            scale: f.scale / t.scale,
            offset: (f.offset - t.offset) / t.scale,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Pascal => "Pa",
            Self::Millibar => "mbar",
            Self::Torr => "Torr",
            Self::Kelvin => "K",
            Self::Celsius => "C",
            Self::CubicMeter => "m^3",
            Self::CubicCentimeter => "cm^3",
            Self::Kilogram => "kg",
            Self::Gram => "g",
            Self::Pound => "lb",
            Self::SquareMeter => "m^2",
            Self::SquareCentimeter => "cm^2",
            Self::KilogramPerCubicMeter => "kg/m^3",
            Self::GramPerCubicCentimeter => "g/cm^3",
            Self::MeterPerSquareSecond => "m/s^2",
            Self::Millisecond => "ms",
            Self::Second => "s",
            Self::PerKelvin => "1/K",
            Self::KilogramPerMol => "kg/mol",
            Self::Dcr => "DCR",
            Self::Newton => "N",
            Self::One => "1",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
