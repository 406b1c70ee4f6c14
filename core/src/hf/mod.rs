//! Self-consistent field method objects.

mod jk;
mod occupation;
mod rhf;
mod uhf;
pub(crate) mod utils;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

pub use jk::{get_jk, restricted_veff, unrestricted_veff};
pub use occupation::Occupation;
pub use rhf::{restricted_hartree_fock, RestrictedHartreeFockOutput, Rhf};
pub use uhf::{unrestricted_hartree_fock, UnrestrictedHartreeFockOutput, Uhf};

use crate::{
    env::Logger,
    error::{ConfigurationError, Result},
};

/// Options controlling the scf iteration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScfControls {
    /// Converged once the energy changes by less than this between iterations.
    pub conv_tol: f64,
    /// Converged once the density rms changes by less than this. Defaults to
    /// `sqrt(conv_tol)`.
    pub conv_tol_grad: Option<f64>,
    /// The maximum number of iterations. Zero iterations never converge.
    pub max_cycle: usize,
    /// Size of the DIIS subspace, 0 disables DIIS.
    pub diis_space: usize,
    /// Fraction of the previous density mixed into the new one, in [0, 1).
    pub damp: f64,
    /// Overlap eigenvalues below this are treated as linear dependencies.
    pub lindep_threshold: f64,
}

impl Default for ScfControls {
    fn default() -> Self {
        Self {
            conv_tol: 1e-9,
            conv_tol_grad: None,
            max_cycle: 50,
            diis_space: 8,
            damp: 0.0,
            lindep_threshold: 1e-8,
        }
    }
}

impl ScfControls {
    pub fn conv_tol_grad(&self) -> f64 {
        self.conv_tol_grad.unwrap_or_else(|| self.conv_tol.sqrt())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigurationError::InvalidControl { name, value })
            }
        };

        positive("conv_tol", self.conv_tol)?;
        positive("conv_tol_grad", self.conv_tol_grad())?;
        positive("lindep_threshold", self.lindep_threshold)?;
        if !(0.0..1.0).contains(&self.damp) {
            return Err(ConfigurationError::InvalidControl {
                name: "damp",
                value: self.damp,
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn dump(&self, logger: &Logger) {
        logger.info(format_args!("max. SCF cycles = {}", self.max_cycle));
        logger.info(format_args!("conv_tol = {:e}", self.conv_tol));
        logger.info(format_args!("conv_tol_grad = {:e}", self.conv_tol_grad()));
        logger.info(format_args!("DIIS space = {}", self.diis_space));
        logger.info(format_args!("damping factor = {}", self.damp));
        logger.info(format_args!("linear dependency threshold = {:e}", self.lindep_threshold));
    }
}

/// The canonical solution descriptors of a mean-field calculation for one set of
/// orbitals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Orbitals {
    /// orbital energies, sorted in ascending order
    pub mo_energy: DVector<f64>,
    /// orbital coefficients, one column per orbital
    pub mo_coeff: DMatrix<f64>,
    /// occupation number of each orbital
    pub mo_occ: DVector<f64>,
}

impl Orbitals {
    pub fn n_mo(&self) -> usize {
        self.mo_energy.len()
    }

    pub fn n_basis(&self) -> usize {
        self.mo_coeff.nrows()
    }

    /// Number of orbitals with a non-zero occupation.
    pub fn n_occupied(&self) -> usize {
        self.mo_occ.iter().filter(|&&occ| occ > 0.0).count()
    }

    /// `C diag(occ) C^T`
    pub fn density(&self) -> DMatrix<f64> {
        utils::density_from_orbitals(&self.mo_coeff, &self.mo_occ)
    }

    /// Highest occupied and (if any) lowest unoccupied orbital energy.
    pub fn homo_lumo(&self) -> (Option<f64>, Option<f64>) {
        let homo = self
            .mo_energy
            .iter()
            .zip(self.mo_occ.iter())
            .filter(|(_, &occ)| occ > 0.0)
            .map(|(&energy, _)| energy)
            .last();
        let lumo = self
            .mo_energy
            .iter()
            .zip(self.mo_occ.iter())
            .find(|(_, &occ)| occ == 0.0)
            .map(|(&energy, _)| energy);
        (homo, lumo)
    }

    /// Checks that these orbitals belong to a basis of `n_basis` functions.
    pub(crate) fn check(&self, n_basis: usize) -> Result<()> {
        let n_mo = self.mo_coeff.ncols();
        if self.mo_coeff.nrows() != n_basis || n_mo > n_basis {
            return Err(ConfigurationError::ShapeMismatch {
                what: "mo_coeff",
                expected: (n_basis, n_mo.min(n_basis)),
                got: self.mo_coeff.shape(),
            }
            .into());
        }
        for (what, vector) in [("mo_energy", &self.mo_energy), ("mo_occ", &self.mo_occ)] {
            if vector.len() != n_mo {
                return Err(ConfigurationError::ShapeMismatch {
                    what,
                    expected: (n_mo, 1),
                    got: vector.shape(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub(crate) fn analyze(&self, label: &str, logger: &Logger) {
        logger.note(format_args!("**** MO energy{label} ****"));
        for (index, (energy, occ)) in self.mo_energy.iter().zip(self.mo_occ.iter()).enumerate() {
            logger.note(format_args!(
                "MO #{:<3} energy= {energy:<18.12} occ= {occ}",
                index + 1
            ));
        }
    }
}

/// Checks that a density matrix has the shape of the basis.
pub(crate) fn check_density(what: &'static str, density: &DMatrix<f64>, n_basis: usize) -> Result<()> {
    if density.shape() != (n_basis, n_basis) {
        return Err(ConfigurationError::ShapeMismatch {
            what,
            expected: (n_basis, n_basis),
            got: density.shape(),
        }
        .into());
    }
    Ok(())
}

/// `tr(D h) + tr(D V)/2`
pub(crate) fn electronic_energy(
    density: &DMatrix<f64>,
    core_hamiltonian: &DMatrix<f64>,
    veff: &DMatrix<f64>,
) -> f64 {
    density.dot(core_hamiltonian) + 0.5 * density.dot(veff)
}

/// Mulliken gross populations `(D S)_ii` of each basis function.
pub fn mulliken_populations(density: &DMatrix<f64>, overlap: &DMatrix<f64>) -> DVector<f64> {
    (density * overlap).diagonal()
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};

    use super::*;

    fn orbitals() -> Orbitals {
        Orbitals {
            mo_energy: DVector::from_column_slice(&[-1.0, 0.5]),
            mo_coeff: DMatrix::identity(2, 2),
            mo_occ: DVector::from_column_slice(&[2.0, 0.0]),
        }
    }

    #[test]
    fn frontier_orbitals() {
        let orbitals = orbitals();
        assert_eq!(orbitals.homo_lumo(), (Some(-1.0), Some(0.5)));
        assert_eq!(orbitals.n_occupied(), 1);
        assert_eq!(orbitals.density()[(0, 0)], 2.0);
    }

    #[test]
    fn orbital_shapes_are_checked() {
        let orbitals = orbitals();
        assert!(orbitals.check(2).is_ok());

        let err = orbitals.check(3).unwrap_err();
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::ShapeMismatch { what: "mo_coeff", .. })
        ));

        let mut broken = orbitals.clone();
        broken.mo_occ = DVector::zeros(3);
        assert!(broken.check(2).is_err());
    }

    #[test]
    fn controls_are_validated() {
        assert!(ScfControls::default().validate().is_ok());

        let controls = ScfControls {
            damp: 1.0,
            ..Default::default()
        };
        assert!(controls.validate().is_err());

        let controls = ScfControls {
            conv_tol: -1.0,
            ..Default::default()
        };
        assert!(controls.validate().is_err());
    }

    #[test]
    fn gradient_tolerance_defaults_to_square_root() {
        let controls = ScfControls {
            conv_tol: 1e-10,
            ..Default::default()
        };
        approx::assert_relative_eq!(controls.conv_tol_grad(), 1e-5, epsilon = 1e-15);
    }
}
