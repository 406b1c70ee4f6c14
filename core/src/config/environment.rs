use std::path::PathBuf;

use serde::Deserialize;

use crate::{
    env::{Environment, OutputSink, Verbosity},
    error::Error,
    system::ModelSystem,
};

use super::ConfigSystem;

/// An environment in a config file: the problem description plus optional
/// defaults. Output goes to stdout unless a file is given.
#[derive(Debug, Deserialize)]
pub struct ConfigEnvironment {
    pub system: ConfigSystem,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
    /// in MB
    #[serde(default)]
    pub max_memory: Option<f64>,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl TryFrom<ConfigEnvironment> for Environment {
    type Error = Error;

    fn try_from(value: ConfigEnvironment) -> Result<Self, Self::Error> {
        let system = ModelSystem::try_from(value.system)?;
        let mut env = Environment::new(system);

        if let Some(verbosity) = value.verbosity {
            env.set_verbosity(verbosity);
        }
        if let Some(max_memory) = value.max_memory {
            env.set_max_memory(max_memory)?;
        }
        if let Some(path) = value.output {
            env.set_output(OutputSink::file(path)?);
        }
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        env::{MaxMemory, Verbosity},
        error::ConfigurationError,
    };

    use super::*;

    const SYSTEM: &str = r#"{
        "name": "one site",
        "n_electrons": 2,
        "overlap": [[1.0]],
        "core_hamiltonian": [[-1.0]],
        "eri": [{ "index": [0, 0, 0, 0], "value": 0.5 }]
    }"#;

    fn load(defaults: &str) -> Result<Environment, Error> {
        let json = format!(r#"{{ "system": {SYSTEM} {defaults} }}"#);
        let config: ConfigEnvironment = serde_json::from_str(&json)?;
        config.try_into()
    }

    #[test]
    fn missing_defaults_keep_the_built_in_ones() {
        let env = load("").unwrap();

        assert_eq!(env.verbosity(), Verbosity::Note);
        assert_eq!(env.max_memory(), MaxMemory::DEFAULT);
    }

    #[test]
    fn defaults_are_read() {
        let env = load(r#", "verbosity": 5, "max_memory": 250.0"#).unwrap();

        assert_eq!(env.verbosity(), Verbosity::Debug);
        assert_eq!(env.max_memory().megabytes(), 250.0);
    }

    #[test]
    fn out_of_range_defaults_are_rejected() {
        assert!(matches!(load(r#", "verbosity": 12"#), Err(Error::Json(_))));

        let err = load(r#", "max_memory": -1.0"#).unwrap_err();
        assert_eq!(
            err.as_configuration(),
            Some(&ConfigurationError::InvalidMemory(-1.0))
        );
    }
}
