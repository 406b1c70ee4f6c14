//! Error types shared by every method object.
//!
//! Three kinds of failure are part of the method-object contract:
//!
//! * [`Error::Configuration`] - a handler, option or problem description was
//!   rejected while an object was being set up.
//! * [`Error::NotConverged`] - an entry operation ran out of iterations.
//! * [`Error::MissingResult`] - an operation needed a cached result that was never
//!   computed.
//!
//! None of them are retried or swallowed. The remaining variants wrap failures of
//! the I/O layer used for loading problem descriptions.

use std::fmt::{Display, Formatter};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Bad or incompatible handler, option or problem description.
    Configuration(ConfigurationError),

    /// The entry operation exceeded its iteration budget.
    NotConverged {
        /// The method that failed to converge.
        method: &'static str,
        /// How many iterations were performed.
        cycles: usize,
        /// Energy change of the last iteration.
        delta_energy: f64,
        /// Density rms change of the last iteration.
        density_rms: f64,
    },

    /// A cached result was needed, but the entry operation never completed.
    MissingResult {
        /// The method whose result slot is empty.
        method: &'static str,
        /// The operation that needed the result.
        operation: &'static str,
    },

    /// Reading a problem description or opening an output sink failed.
    Io(std::io::Error),

    /// A problem description was not valid json.
    Json(serde_json::Error),
}

/// The precise reason a configuration was rejected.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// Verbosity levels range from 0 (quiet) to 9.
    InvalidVerbosity(u8),

    /// The memory budget must be finite and positive (in MB).
    InvalidMemory(f64),

    /// A control option is out of its allowed range.
    InvalidControl {
        /// Name of the option.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// An array did not have the dimensions the problem requires.
    ShapeMismatch {
        /// What was being checked.
        what: &'static str,
        /// Expected `(rows, columns)`.
        expected: (usize, usize),
        /// Actual `(rows, columns)`.
        got: (usize, usize),
    },

    /// The handler cannot serve as the source of a method object.
    IncompatibleHandler {
        /// The method being constructed.
        method: &'static str,
        /// Why the handler was rejected.
        reason: String,
    },

    /// The problem description itself is inconsistent.
    InvalidSystem(String),

    /// The memory budget is too small for even the smallest working set.
    InsufficientMemory {
        /// Required memory in MB.
        required: f64,
        /// Available memory in MB.
        available: f64,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "configuration error: {err}"),
            Error::NotConverged {
                method,
                cycles,
                delta_energy,
                density_rms,
            } => write!(
                f,
                "{method} did not converge after {cycles} cycles (delta E = {delta_energy:.3e}, density rms = {density_rms:.3e})"
            ),
            Error::MissingResult { method, operation } => write!(
                f,
                "{operation} needs the result of {method}, but its kernel has not been run"
            ),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "invalid json: {err}"),
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::InvalidVerbosity(level) => {
                write!(f, "verbosity must be between 0 and 9, got {level}")
            }
            ConfigurationError::InvalidMemory(budget) => {
                write!(f, "memory budget must be finite and positive, got {budget} MB")
            }
            ConfigurationError::InvalidControl { name, value } => {
                write!(f, "invalid value {value} for option {name}")
            }
            ConfigurationError::ShapeMismatch {
                what,
                expected,
                got,
            } => write!(
                f,
                "{what} has shape {}x{}, expected {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            ConfigurationError::IncompatibleHandler { method, reason } => {
                write!(f, "cannot construct {method}: {reason}")
            }
            ConfigurationError::InvalidSystem(reason) => write!(f, "invalid system: {reason}"),
            ConfigurationError::InsufficientMemory {
                required,
                available,
            } => write!(
                f,
                "not enough memory: {required:.1} MB required, {available:.1} MB available"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Configuration(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for Error {
    fn from(value: ConfigurationError) -> Self {
        Error::Configuration(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}

impl Error {
    /// Returns the configuration error, if this is one.
    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            Error::Configuration(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_converged(&self) -> bool {
        matches!(self, Error::NotConverged { .. })
    }

    pub fn is_missing_result(&self) -> bool {
        matches!(self, Error::MissingResult { .. })
    }
}
