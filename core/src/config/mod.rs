//! Json representations of problem descriptions and environments.

mod environment;
mod system;

pub use environment::ConfigEnvironment;
pub use system::{ConfigIntegral, ConfigSystem};
