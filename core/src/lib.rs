//! Method objects for mean-field and correlated quantum-chemistry calculations on
//! externally supplied integrals.
//!
//! An [`env::Environment`] holds a problem description together with default
//! verbosity, output sink and memory budget. Method objects ([`hf::Rhf`],
//! [`hf::Uhf`], [`mp2::Mp2`]) are constructed from an environment or from another
//! method object, copy its defaults, and cache the result of their
//! [`method::Method::kernel`].

pub mod config;
pub mod conventions;
mod diis;
pub mod env;
pub mod error;
pub mod hf;
pub mod integrals;
pub mod method;
pub mod mp2;
pub mod system;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::{
        env::{Environment, OutputSink, Verbosity},
        error::{ConfigurationError, Error, Result},
        hf::{Occupation, Orbitals, Rhf, ScfControls, Uhf},
        method::{kernel_all, Handler, HandlerKind, Method, MethodState, Overrides},
        mp2::Mp2,
        system::ModelSystem,
    };
}

/// Small systems with published reference values, for tests and benchmarks.
pub mod testing {
    use crate::{config::ConfigSystem, system::ModelSystem};

    const H2_STO3G: &str = include_str!("../../data/systems/h2_sto-3g.json");
    const HEH_STO3G: &str = include_str!("../../data/systems/heh+_sto-3g.json");
    const H4_STO3G: &str = include_str!("../../data/systems/h4_sto-3g.json");

    fn parse(json: &str) -> ModelSystem {
        let config: ConfigSystem = serde_json::from_str(json).expect("invalid test system");
        config.try_into().expect("inconsistent test system")
    }

    /// H2 in a minimal basis at 1.4 bohr.
    pub fn h2_sto3g() -> ModelSystem {
        parse(H2_STO3G)
    }

    /// H2 at 1.4 bohr with both electrons spin up.
    pub fn h2_sto3g_triplet() -> ModelSystem {
        let mut config: ConfigSystem =
            serde_json::from_str(H2_STO3G).expect("invalid test system");
        config.name = "H2 STO-3G triplet (R = 1.4 bohr)".to_string();
        config.spin = 2;
        config.try_into().expect("inconsistent test system")
    }

    /// HeH+ in a minimal basis at 1.4632 bohr.
    pub fn heh_sto3g() -> ModelSystem {
        parse(HEH_STO3G)
    }

    /// Four hydrogen atoms in a bent chain without spatial symmetry, minimal basis.
    /// Reference values: E_elec = -4.731286357, E_tot = -2.204373007,
    /// E_corr(MP2) = -0.027919553.
    pub fn h4_sto3g() -> ModelSystem {
        parse(H4_STO3G)
    }
}
