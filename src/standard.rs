use std::collections::BTreeMap;

use log::debug;
use ndarray::Array1;

use crate::constants::Constants;
use crate::device::{Cdg, Dmm, Qbs, Srg};
use crate::expansion::ExpansionStandard;
use crate::frs5::Frs5;
use crate::group_normal::GroupNormal;
use crate::model::{Inputs, Model};
use crate::uncert::{Propagated, Propagator};
use crate::{Error, Result};

/// A calibration standard or transfer device: the capability set the
/// calculation core exposes per registry entry.
///
/// `define_model` builds the standard's algebraic pressure (or correction)
/// model; the provided `evaluate`/`evaluate_uncertainty` drive it through
/// the shared evaluator and propagator. `prepare` is the hook where a
/// standard derives parameters the raw inputs do not carry directly (gas
/// density from an approximate pressure, real-gas factors, thermally
/// corrected volumes).
pub trait Standard {
    fn name(&self) -> &str;

    /// Build the model over the supplied quantities and parameters.
    ///
    /// # Errors
    /// [`Error::ModelDefinition`] when a required symbol has neither a
    /// quantity nor a parameter.
    fn define_model(&self, inputs: &Inputs) -> Result<Model>;

    /// Derive auxiliary parameters from the raw inputs. The default keeps
    /// the inputs as they are.
    ///
    /// # Errors
    /// Standard-specific; see the implementations.
    fn prepare(&self, inputs: &Inputs) -> Result<Inputs> {
        Ok(inputs.clone())
    }

    /// The result series in the model's unit, one row per measurement row.
    ///
    /// # Errors
    /// Propagates model definition, shape and unit errors.
    fn evaluate(&self, inputs: &Inputs) -> Result<Array1<f64>> {
        let prepared = self.prepare(inputs)?;
        let model = self.define_model(&prepared)?;
        let bindings = model.bind(&prepared)?;
        model.evaluate(&bindings)
    }

    /// GUM propagation over the standard's model: combined standard
    /// uncertainty plus the per-symbol breakdown.
    ///
    /// # Errors
    /// Propagates model definition, shape, unit and derivative errors.
    fn evaluate_uncertainty(&self, inputs: &Inputs) -> Result<Propagated> {
        let prepared = self.prepare(inputs)?;
        let model = self.define_model(&prepared)?;
        let point = model.bind(&prepared)?;
        let stdevs = model.stdev_bindings(&prepared)?;
        let mut propagator = Propagator::new(model);
        propagator.propagate(&point, &stdevs, None)
    }
}

/// Name-to-implementation dispatch table, built once at startup.
///
/// The closed set of variants replaces the original's string-keyed
/// duck-typing; an unrecognised name is an error, never a guessed default.
pub struct Registry {
    standards: BTreeMap<String, Box<dyn Standard>>,
}

impl Registry {
    /// An empty registry; use [`Registry::register`] to populate.
    pub fn new() -> Self {
        Self {
            standards: BTreeMap::new(),
        }
    }

    /// The full dispatch table over the built-in standards and devices,
    /// with their default configurations.
    pub fn with_defaults(constants: &Constants) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Frs5::new(constants.clone(), crate::frs5::Frs5Config::default())));
        registry.register(Box::new(ExpansionStandard::se2(constants.clone())));
        registry.register(Box::new(ExpansionStandard::se3(constants.clone())));
        registry.register(Box::new(GroupNormal::default()));
        registry.register(Box::new(Cdg::default()));
        registry.register(Box::new(Srg::new(constants.clone())));
        registry.register(Box::new(Dmm::default()));
        registry.register(Box::new(Qbs::default()));
        registry
    }

    pub fn register(&mut self, standard: Box<dyn Standard>) {
        debug!("registering standard {}", standard.name());
        self.standards.insert(standard.name().to_owned(), standard);
    }

    /// # Errors
    /// [`Error::UnknownStandard`] for an unrecognised name.
    pub fn resolve(&self, name: &str) -> Result<&dyn Standard> {
        self.standards
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::UnknownStandard(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.standards.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
