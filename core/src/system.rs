use nalgebra::DMatrix;

use crate::{
    error::{ConfigurationError, Result},
    integrals::ElectronTensor,
};

/// The problem a method object works on: a finite basis with its one- and
/// two-electron integrals and the electron count.
///
/// How the integrals were obtained is not this crate's concern; they are read
/// from a problem description (see [`crate::config::ConfigSystem`]) or built in
/// code with [`ModelSystem::new`].
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSystem {
    name: String,
    n_electrons: usize,
    /// 2S, the number of alpha electrons minus the number of beta electrons
    spin: usize,
    nuclear_repulsion: f64,
    overlap: DMatrix<f64>,
    core_hamiltonian: DMatrix<f64>,
    eri: ElectronTensor,
}

/// Problem-size parameters. Copied into a method object at construction and
/// never changed afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProblemSize {
    pub n_basis: usize,
    pub n_alpha: usize,
    pub n_beta: usize,
}

impl ProblemSize {
    pub fn n_electrons(&self) -> usize {
        self.n_alpha + self.n_beta
    }

    pub fn is_closed_shell(&self) -> bool {
        self.n_alpha == self.n_beta
    }
}

impl ModelSystem {
    /// Validates and assembles a problem description.
    pub fn new(
        name: impl Into<String>,
        n_electrons: usize,
        spin: usize,
        nuclear_repulsion: f64,
        overlap: DMatrix<f64>,
        core_hamiltonian: DMatrix<f64>,
        eri: ElectronTensor,
    ) -> Result<Self> {
        let n_basis = overlap.nrows();

        if n_basis == 0 {
            return Err(invalid("the basis is empty"));
        }
        check_shape("overlap matrix", &overlap, n_basis)?;
        check_shape("core hamiltonian", &core_hamiltonian, n_basis)?;
        if eri.size() != n_basis {
            return Err(ConfigurationError::ShapeMismatch {
                what: "electron repulsion tensor",
                expected: (n_basis, n_basis),
                got: (eri.size(), eri.size()),
            }
            .into());
        }

        if !nuclear_repulsion.is_finite() {
            return Err(invalid("nuclear repulsion is not finite"));
        }
        for (what, matrix) in [("overlap matrix", &overlap), ("core hamiltonian", &core_hamiltonian)] {
            if matrix.iter().any(|x| !x.is_finite()) {
                return Err(invalid(format!("{what} has non-finite entries")));
            }
            if !is_symmetric(matrix) {
                return Err(invalid(format!("{what} is not symmetric")));
            }
        }
        if overlap.diagonal().iter().any(|&s| s <= 0.0) {
            return Err(invalid("overlap matrix has non-positive diagonal entries"));
        }
        if eri.iter_unique().any(|(_, x)| !x.is_finite()) {
            return Err(invalid("electron repulsion integrals have non-finite entries"));
        }

        if spin > n_electrons {
            return Err(invalid(format!(
                "spin 2S = {spin} exceeds the number of electrons {n_electrons}"
            )));
        }
        if (n_electrons + spin) % 2 != 0 {
            return Err(invalid(format!(
                "spin 2S = {spin} is incompatible with {n_electrons} electrons"
            )));
        }
        let n_alpha = (n_electrons + spin) / 2;
        if n_alpha > n_basis {
            return Err(invalid(format!(
                "{n_alpha} alpha electrons do not fit into {n_basis} basis functions"
            )));
        }

        Ok(Self {
            name: name.into(),
            n_electrons,
            spin,
            nuclear_repulsion,
            overlap,
            core_hamiltonian,
            eri,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_basis(&self) -> usize {
        self.overlap.nrows()
    }

    /// Returns the number of total electrons in the system
    pub fn n_electrons(&self) -> usize {
        self.n_electrons
    }

    pub fn spin(&self) -> usize {
        self.spin
    }

    /// Returns the number of electrons in the alpha (by convention, spin up) state
    pub fn n_alpha(&self) -> usize {
        (self.n_electrons + self.spin) / 2
    }

    /// Returns the number of electrons in the beta (by convention, spin down) state
    pub fn n_beta(&self) -> usize {
        (self.n_electrons - self.spin) / 2
    }

    pub fn size(&self) -> ProblemSize {
        ProblemSize {
            n_basis: self.n_basis(),
            n_alpha: self.n_alpha(),
            n_beta: self.n_beta(),
        }
    }

    pub fn nuclear_repulsion(&self) -> f64 {
        self.nuclear_repulsion
    }

    pub fn overlap(&self) -> &DMatrix<f64> {
        &self.overlap
    }

    pub fn core_hamiltonian(&self) -> &DMatrix<f64> {
        &self.core_hamiltonian
    }

    pub fn eri(&self) -> &ElectronTensor {
        &self.eri
    }
}

fn invalid(reason: impl Into<String>) -> crate::Error {
    ConfigurationError::InvalidSystem(reason.into()).into()
}

fn check_shape(what: &'static str, matrix: &DMatrix<f64>, n: usize) -> Result<()> {
    if matrix.shape() != (n, n) {
        return Err(ConfigurationError::ShapeMismatch {
            what,
            expected: (n, n),
            got: matrix.shape(),
        }
        .into());
    }
    Ok(())
}

fn is_symmetric(matrix: &DMatrix<f64>) -> bool {
    const TOLERANCE: f64 = 1e-10;
    let scale = matrix.amax().max(1.0);
    (matrix - matrix.transpose()).amax() <= TOLERANCE * scale
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::{error::Error, testing};

    fn one_orbital(n_electrons: usize, spin: usize) -> Result<ModelSystem> {
        ModelSystem::new(
            "toy",
            n_electrons,
            spin,
            0.0,
            DMatrix::identity(1, 1),
            DMatrix::from_element(1, 1, -1.0),
            ElectronTensor::from_fn(1, |_, _, _, _| 0.5),
        )
    }

    #[test]
    fn electron_counts_follow_spin() {
        let system = one_orbital(1, 1).unwrap();
        assert_eq!(system.n_alpha(), 1);
        assert_eq!(system.n_beta(), 0);
        assert!(!system.size().is_closed_shell());

        let h2 = testing::h2_sto3g();
        assert_eq!(
            h2.size(),
            ProblemSize {
                n_basis: 2,
                n_alpha: 1,
                n_beta: 1
            }
        );
    }

    #[test]
    fn spin_parity_is_checked() {
        let err = one_orbital(2, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::InvalidSystem(_))
        ));
    }

    #[test]
    fn too_many_electrons_are_rejected() {
        assert!(one_orbital(3, 1).is_err());
        assert!(one_orbital(2, 0).is_ok());
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let err = ModelSystem::new(
            "broken",
            2,
            0,
            0.0,
            DMatrix::identity(2, 2),
            DMatrix::identity(3, 3),
            ElectronTensor::zeros(2),
        )
        .unwrap_err();

        assert_eq!(
            err.as_configuration(),
            Some(&ConfigurationError::ShapeMismatch {
                what: "core hamiltonian",
                expected: (2, 2),
                got: (3, 3),
            })
        );
    }

    #[test]
    fn asymmetric_overlap_is_rejected() {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        let err = ModelSystem::new(
            "broken",
            2,
            0,
            0.0,
            overlap,
            DMatrix::identity(2, 2),
            ElectronTensor::zeros(2),
        );
        assert!(err.is_err());
    }
}
