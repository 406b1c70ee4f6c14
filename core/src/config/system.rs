use std::collections::HashMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigurationError, Error},
    integrals::{ElectronTensor, IntegralIndex},
    system::ModelSystem,
};

/// A problem description in a config file.
///
/// Matrices are given row by row. Two-electron integrals are listed once per
/// symmetry-unique index in chemists' notation, integrals that are not listed
/// are zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigSystem {
    pub name: String,
    pub n_electrons: usize,
    /// 2S, the number of alpha minus the number of beta electrons
    #[serde(default)]
    pub spin: usize,
    #[serde(default)]
    pub nuclear_repulsion: f64,
    pub overlap: Vec<Vec<f64>>,
    pub core_hamiltonian: Vec<Vec<f64>>,
    pub eri: Vec<ConfigIntegral>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigIntegral {
    pub index: [usize; 4],
    pub value: f64,
}

fn matrix(what: &'static str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>, ConfigurationError> {
    let n = rows.len();
    if let Some(row) = rows.iter().find(|row| row.len() != n) {
        return Err(ConfigurationError::ShapeMismatch {
            what,
            expected: (n, n),
            got: (n, row.len()),
        });
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

impl TryFrom<ConfigSystem> for ModelSystem {
    type Error = Error;

    fn try_from(value: ConfigSystem) -> Result<Self, Self::Error> {
        let overlap = matrix("overlap matrix", &value.overlap)?;
        let core_hamiltonian = matrix("core hamiltonian", &value.core_hamiltonian)?;
        let n_basis = overlap.nrows();

        let mut eri = ElectronTensor::zeros(n_basis);
        let mut seen = HashMap::new();
        for ConfigIntegral { index, value } in value.eri {
            let [i, j, k, l] = index;
            if index.iter().any(|&x| x >= n_basis) {
                return Err(ConfigurationError::InvalidSystem(format!(
                    "integral ({i}{j}|{k}{l}) is out of range for {n_basis} basis functions"
                ))
                .into());
            }

            let canonical = IntegralIndex::new((i, j, k, l));
            match seen.insert(canonical, value) {
                Some(previous) if previous != value => {
                    return Err(ConfigurationError::InvalidSystem(format!(
                        "integral ({i}{j}|{k}{l}) is given twice with different values {previous} and {value}"
                    ))
                    .into());
                }
                _ => eri.set((i, j, k, l), value),
            }
        }

        ModelSystem::new(
            value.name,
            value.n_electrons,
            value.spin,
            value.nuclear_repulsion,
            overlap,
            core_hamiltonian,
            eri,
        )
    }
}

impl From<&ModelSystem> for ConfigSystem {
    fn from(system: &ModelSystem) -> Self {
        let rows = |matrix: &DMatrix<f64>| {
            matrix
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect()
        };

        Self {
            name: system.name().to_string(),
            n_electrons: system.n_electrons(),
            spin: system.spin(),
            nuclear_repulsion: system.nuclear_repulsion(),
            overlap: rows(system.overlap()),
            core_hamiltonian: rows(system.core_hamiltonian()),
            eri: system
                .eri()
                .iter_unique()
                .filter(|&(_, value)| value != 0.0)
                .map(|(index, value)| {
                    let (i, j, k, l) = index.indices();
                    ConfigIntegral {
                        index: [i, j, k, l],
                        value,
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::testing;

    fn parse(json: &str) -> Result<ModelSystem, Error> {
        let config: ConfigSystem = serde_json::from_str(json)?;
        config.try_into()
    }

    #[test]
    fn equivalent_indices_fill_the_same_integral() {
        let system = parse(
            r#"{
                "name": "two sites",
                "n_electrons": 2,
                "overlap": [[1.0, 0.5], [0.5, 1.0]],
                "core_hamiltonian": [[-1.0, -0.5], [-0.5, -1.0]],
                "eri": [
                    { "index": [1, 0, 0, 0], "value": 0.25 },
                    { "index": [0, 1, 0, 0], "value": 0.25 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(system.spin(), 0);
        assert_eq!(system.eri()[(0, 0, 0, 1)], 0.25);
        assert_eq!(system.eri()[(1, 1, 1, 1)], 0.0);
    }

    #[test]
    fn conflicting_duplicates_are_rejected() {
        let err = parse(
            r#"{
                "name": "conflict",
                "n_electrons": 2,
                "overlap": [[1.0]],
                "core_hamiltonian": [[-1.0]],
                "eri": [
                    { "index": [0, 0, 0, 0], "value": 0.7 },
                    { "index": [0, 0, 0, 0], "value": 0.8 }
                ]
            }"#,
        )
        .unwrap_err();

        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::InvalidSystem(_))
        ));
    }

    #[test]
    fn ragged_matrices_are_rejected() {
        let err = parse(
            r#"{
                "name": "ragged",
                "n_electrons": 2,
                "overlap": [[1.0, 0.1], [0.1]],
                "core_hamiltonian": [[-1.0, 0.0], [0.0, -1.0]],
                "eri": []
            }"#,
        )
        .unwrap_err();

        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::ShapeMismatch { what: "overlap matrix", .. })
        ));
    }

    #[test]
    fn out_of_range_integrals_are_rejected() {
        let err = parse(
            r#"{
                "name": "range",
                "n_electrons": 2,
                "overlap": [[1.0]],
                "core_hamiltonian": [[-1.0]],
                "eri": [{ "index": [0, 0, 0, 1], "value": 0.1 }]
            }"#,
        )
        .unwrap_err();

        assert!(err.as_configuration().is_some());
    }

    #[test]
    fn systems_survive_a_json_round_trip() {
        for system in [testing::heh_sto3g(), testing::h4_sto3g()] {
            let json = serde_json::to_string(&ConfigSystem::from(&system)).unwrap();
            let parsed = parse(&json).unwrap();

            assert_eq!(parsed.size(), system.size());
            assert_relative_eq!(parsed.overlap(), system.overlap(), epsilon = 1e-14);
            assert_relative_eq!(
                parsed.eri().to_supermatrix(),
                system.eri().to_supermatrix(),
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn listed_integrals_are_read_back_under_every_permutation() {
        let json = include_str!("../../../data/systems/h4_sto-3g.json");
        let config: ConfigSystem = serde_json::from_str(json).unwrap();
        let listed = config.eri.clone();
        let system = ModelSystem::try_from(config).unwrap();

        assert_eq!(listed.len(), system.eri().n_unique());
        for ConfigIntegral { index: [i, j, k, l], value } in listed {
            for (p, q, r, s) in [
                (i, j, k, l),
                (j, i, k, l),
                (i, j, l, k),
                (j, i, l, k),
                (k, l, i, j),
                (l, k, i, j),
                (k, l, j, i),
                (l, k, j, i),
            ] {
                assert_eq!(system.eri()[(p, q, r, s)], value, "({p} {q}|{r} {s})");
            }
        }
    }
}
