//! The environment holder: process wide defaults for method objects.
//!
//! An [`Environment`] owns the problem description and three defaults - the
//! verbosity, the output sink and the memory budget. Method objects copy these
//! defaults when they are constructed, so changing the environment afterwards
//! never changes an existing method object.

mod logger;
mod output;

use std::{fmt, path::Path, sync::Arc};

pub use logger::{Logger, Verbosity};
pub use output::OutputSink;

use crate::{
    error::{ConfigurationError, Result},
    method::{Handler, HandlerKind},
    system::ModelSystem,
};

/// A memory budget in megabytes.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct MaxMemory(f64);

impl MaxMemory {
    /// The budget used unless configured otherwise.
    pub const DEFAULT: MaxMemory = MaxMemory(4000.0);

    pub fn new(megabytes: f64) -> Result<Self, ConfigurationError> {
        if megabytes.is_finite() && megabytes > 0.0 {
            Ok(Self(megabytes))
        } else {
            Err(ConfigurationError::InvalidMemory(megabytes))
        }
    }

    pub fn megabytes(self) -> f64 {
        self.0
    }

    /// Returns true if `n_floats` double precision numbers fit into this budget.
    pub fn fits(self, n_floats: usize) -> bool {
        megabytes_for(n_floats) <= self.0
    }
}

impl Default for MaxMemory {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for MaxMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MB", self.0)
    }
}

/// Size of `n_floats` double precision numbers in MB.
pub(crate) fn megabytes_for(n_floats: usize) -> f64 {
    (n_floats * std::mem::size_of::<f64>()) as f64 / 1e6
}

/// A snapshot of the defaults a method object inherits from its handler.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Defaults {
    pub verbosity: Verbosity,
    pub output: OutputSink,
    pub max_memory: MaxMemory,
}

impl Defaults {
    pub fn logger(&self, target: &'static str) -> Logger<'_> {
        Logger::new(self.verbosity, &self.output, target)
    }
}

/// Holds the problem description and the defaults every method object starts with.
#[derive(Debug)]
pub struct Environment {
    system: Arc<ModelSystem>,
    defaults: Defaults,
}

impl Environment {
    /// Creates an environment for `system` with default verbosity, stdout as the
    /// output sink and the default memory budget.
    pub fn new(system: ModelSystem) -> Self {
        Self::from_shared(Arc::new(system))
    }

    /// Like [`Environment::new`], for a system that is already shared.
    pub fn from_shared(system: Arc<ModelSystem>) -> Self {
        Self {
            system,
            defaults: Defaults::default(),
        }
    }

    /// Loads an environment from a json document, see [`crate::config::ConfigEnvironment`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let config: crate::config::ConfigEnvironment =
            serde_json::from_reader(std::io::BufReader::new(file))?;
        let env: Self = config.try_into()?;

        env.logger().info(format_args!(
            "environment {} loaded: system {} with {} basis functions, verbosity {}, max_memory {}",
            path.display(),
            env.system.name(),
            env.system.n_basis(),
            env.verbosity(),
            env.max_memory()
        ));
        Ok(env)
    }

    pub fn system(&self) -> &Arc<ModelSystem> {
        &self.system
    }

    pub fn verbosity(&self) -> Verbosity {
        self.defaults.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) -> &mut Self {
        self.defaults.verbosity = verbosity;
        self
    }

    pub fn output(&self) -> &OutputSink {
        &self.defaults.output
    }

    pub fn set_output(&mut self, output: OutputSink) -> &mut Self {
        self.defaults.output = output;
        self
    }

    pub fn max_memory(&self) -> MaxMemory {
        self.defaults.max_memory
    }

    /// Sets the memory budget in MB. Fails for non-finite or non-positive budgets.
    pub fn set_max_memory(&mut self, megabytes: f64) -> Result<&mut Self> {
        self.defaults.max_memory = MaxMemory::new(megabytes)?;
        Ok(self)
    }

    pub fn logger(&self) -> Logger<'_> {
        self.defaults.logger("qchem::env")
    }
}

impl Handler for Environment {
    fn system(&self) -> &Arc<ModelSystem> {
        &self.system
    }

    fn defaults(&self) -> Defaults {
        self.defaults.clone()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Environment
    }
}
