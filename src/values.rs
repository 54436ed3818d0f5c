use ndarray::Array1;
use num_traits::Float;

use crate::units::Unit;
use crate::{Error, Result};

/// A unit-tagged measurement series.
///
/// Holds the ordered values of one measurement channel together with the
/// optional per-sample timestamps and standard deviations. The optional
/// sequences are aligned 1:1 with the values; the alignment is checked at
/// construction and the quantity is immutable afterwards — a new measurement
/// pull re-constructs rather than mutates.
#[derive(Clone, Debug)]
pub struct Quantity {
    name: String,
    values: Array1<f64>,
    unit: Unit,
    timestamps: Option<Array1<f64>>,
    stdev: Option<Array1<f64>>,
}

impl Quantity {
    pub fn new(name: impl Into<String>, values: Array1<f64>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            values,
            unit,
            timestamps: None,
            stdev: None,
        }
    }

    /// A single-sample quantity.
    pub fn scalar(name: impl Into<String>, value: f64, unit: Unit) -> Self {
        Self::new(name, Array1::from_elem(1, value), unit)
    }

    /// Attach timestamps aligned with the values.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the lengths differ.
    pub fn with_timestamps(mut self, timestamps: Array1<f64>) -> Result<Self> {
        if timestamps.len() != self.values.len() {
            return Err(Error::ShapeMismatch {
                symbol: format!("{}.timestamps", self.name),
                len: timestamps.len(),
                expected: self.values.len(),
            });
        }
        self.timestamps = Some(timestamps);
        Ok(self)
    }

    /// Attach per-sample standard deviations aligned with the values.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the lengths differ.
    pub fn with_stdev(mut self, stdev: Array1<f64>) -> Result<Self> {
        if stdev.len() != self.values.len() {
            return Err(Error::ShapeMismatch {
                symbol: format!("{}.stdev", self.name),
                len: stdev.len(),
                expected: self.values.len(),
            });
        }
        self.stdev = Some(stdev);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub const fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub const fn unit(&self) -> Unit {
        self.unit
    }

    pub const fn timestamps(&self) -> Option<&Array1<f64>> {
        self.timestamps.as_ref()
    }

    pub const fn stdev(&self) -> Option<&Array1<f64>> {
        self.stdev.as_ref()
    }

    /// Re-construct the quantity in another unit.
    ///
    /// Values convert with the full affine conversion; standard deviations
    /// are spreads and only scale. Timestamps are carried unchanged.
    ///
    /// # Errors
    /// [`Error::UnitMismatch`] if the units belong to different dimensions.
    pub fn convert_to(&self, unit: Unit) -> Result<Self> {
        let conv = self.unit.conversion_to(unit)?;
        Ok(Self {
            name: self.name.clone(),
            values: self.values.mapv(|v| conv.apply(v)),
            unit,
            timestamps: self.timestamps.clone(),
            stdev: self
                .stdev
                .as_ref()
                .map(|s| s.mapv(|v| conv.apply_spread(v))),
        })
    }
}

/// Round each element to `n` significant digits.
///
/// Used when results are handed back to the persistence collaborator; the
/// calculation itself always runs at full precision.
pub fn round_to_n<T: Float>(values: &Array1<T>, n: u32) -> Array1<T> {
    values.mapv(|x| {
        if x == T::zero() || !x.is_finite() {
            return x;
        }
        let digits = T::from(n - 1).expect("digit count must fit in `T`");
        let power = digits - x.abs().log10().floor();
        let factor = T::from(10.0).expect("10 must fit in `T`").powf(power);
        (x * factor).round() / factor
    })
}
