use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::{
    diis::Diis,
    env::{Defaults, Logger},
    error::{ConfigurationError, Error, Result},
    method::{Handler, HandlerKind, Method, MethodCore, MethodState, Overrides},
    system::{ModelSystem, ProblemSize},
};

use super::{
    check_density, electronic_energy, mulliken_populations, restricted_veff, utils, Occupation,
    Orbitals, ScfControls,
};

/// The output of a restricted hartree fock calculation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub struct RestrictedHartreeFockOutput {
    /// the converged orbitals, sorted by ascending energy
    pub orbitals: Orbitals,
    /// The electronic energy of the system
    pub electronic_energy: f64,
    /// The nuclear repulsion energy
    pub nuclear_repulsion: f64,
    /// After how many iterations did the system converge
    pub iterations: usize,
}

impl RestrictedHartreeFockOutput {
    pub fn total_energy(&self) -> f64 {
        self.electronic_energy + self.nuclear_repulsion
    }
}

/// Closed-shell hartree fock.
///
/// Rejects open-shell systems at construction. The converged result can serve as
/// the reference of a later correlation method, see [`crate::mp2::Mp2`].
#[derive(Debug)]
pub struct Rhf {
    core: MethodCore<RestrictedHartreeFockOutput>,
    controls: ScfControls,
    occupation: Occupation,
}

impl Rhf {
    pub fn new(handler: &(impl Handler + ?Sized)) -> Result<Self> {
        let core = MethodCore::new(handler);
        if !core.size.is_closed_shell() {
            return Err(ConfigurationError::IncompatibleHandler {
                method: Self::NAME,
                reason: format!(
                    "{} alpha and {} beta electrons is not a closed shell",
                    core.size.n_alpha, core.size.n_beta
                ),
            }
            .into());
        }

        Ok(Self {
            core,
            controls: ScfControls::default(),
            occupation: Occupation::default(),
        })
    }

    pub fn size(&self) -> ProblemSize {
        self.core.size
    }

    pub fn controls(&self) -> &ScfControls {
        &self.controls
    }

    pub fn occupation(&self) -> Occupation {
        self.occupation
    }

    /// Replaces all scf controls at once. Invalid controls are rejected and the
    /// previous ones kept.
    pub fn set_controls(&mut self, controls: ScfControls) -> Result<&mut Self> {
        controls.validate()?;
        if controls != self.controls {
            self.controls = controls;
            self.core.slot.mark_stale();
        }
        Ok(self)
    }

    pub fn set_conv_tol(&mut self, conv_tol: f64) -> Result<&mut Self> {
        self.set_controls(ScfControls {
            conv_tol,
            ..self.controls
        })
    }

    pub fn set_max_cycle(&mut self, max_cycle: usize) -> &mut Self {
        if max_cycle != self.controls.max_cycle {
            self.controls.max_cycle = max_cycle;
            self.core.slot.mark_stale();
        }
        self
    }

    pub fn set_diis_space(&mut self, diis_space: usize) -> &mut Self {
        if diis_space != self.controls.diis_space {
            self.controls.diis_space = diis_space;
            self.core.slot.mark_stale();
        }
        self
    }

    pub fn set_damp(&mut self, damp: f64) -> Result<&mut Self> {
        self.set_controls(ScfControls {
            damp,
            ..self.controls
        })
    }

    pub fn set_occupation(&mut self, occupation: Occupation) -> Result<&mut Self> {
        if let Occupation::Fractional { tol } = occupation {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(ConfigurationError::InvalidControl {
                    name: "occupation tolerance",
                    value: tol,
                }
                .into());
            }
        }
        if occupation != self.occupation {
            self.occupation = occupation;
            self.core.slot.mark_stale();
        }
        Ok(self)
    }

    fn logger(&self) -> Logger<'_> {
        self.core.defaults.logger("qchem::rhf")
    }

    /// Runs the scf iteration, starting from `dm0` if given and from an extended
    /// hückel guess otherwise.
    pub fn kernel_with(
        &mut self,
        dm0: Option<&DMatrix<f64>>,
    ) -> Result<Arc<RestrictedHartreeFockOutput>> {
        self.dump_flags();
        let output = restricted_hartree_fock(
            &self.core.system,
            &self.controls,
            self.occupation,
            dm0,
            &self.logger(),
        )?;
        Ok(self.core.slot.install(output))
    }

    /// Orbitals to use when the caller passes none.
    fn orbitals_or_result<'a>(
        &'a self,
        orbitals: Option<&'a Orbitals>,
        operation: &'static str,
    ) -> Result<&'a Orbitals> {
        match orbitals {
            Some(orbitals) => {
                orbitals.check(self.core.size.n_basis)?;
                Ok(orbitals)
            }
            None => Ok(&self.core.slot.get(Self::NAME, operation)?.orbitals),
        }
    }

    /// The one-particle density matrix of `orbitals`, or of the cached solution.
    pub fn make_rdm1(&self, orbitals: Option<&Orbitals>) -> Result<DMatrix<f64>> {
        Ok(self.orbitals_or_result(orbitals, "make_rdm1")?.density())
    }

    /// Electronic energy of a density matrix, or of the cached solution.
    pub fn energy_elec(&self, density: Option<&DMatrix<f64>>) -> Result<f64> {
        let density = match density {
            Some(density) => {
                check_density("density matrix", density, self.core.size.n_basis)?;
                density.clone()
            }
            None => self.make_rdm1(None)?,
        };

        let system = &self.core.system;
        let veff = restricted_veff(system.eri(), &density);
        Ok(electronic_energy(&density, system.core_hamiltonian(), &veff))
    }

    pub fn energy_tot(&self, density: Option<&DMatrix<f64>>) -> Result<f64> {
        Ok(self.energy_elec(density)? + self.core.system.nuclear_repulsion())
    }

    /// Highest occupied and lowest unoccupied orbital energy.
    pub fn homo_lumo(&self, orbitals: Option<&Orbitals>) -> Result<(Option<f64>, Option<f64>)> {
        Ok(self.orbitals_or_result(orbitals, "homo_lumo")?.homo_lumo())
    }

    /// Mulliken gross population of every basis function.
    pub fn mulliken_pop(&self, density: Option<&DMatrix<f64>>) -> Result<DVector<f64>> {
        let density = match density {
            Some(density) => {
                check_density("density matrix", density, self.core.size.n_basis)?;
                density.clone()
            }
            None => self.make_rdm1(None)?,
        };
        Ok(mulliken_populations(&density, self.core.system.overlap()))
    }

    /// Writes orbital energies, occupations and populations of the cached solution
    /// to the output sink.
    pub fn analyze(&self) -> Result<()> {
        let output = self.core.slot.get(Self::NAME, "analyze")?;
        let logger = self.logger();

        output.orbitals.analyze("", &logger);

        let populations = self.mulliken_pop(None)?;
        logger.note(format_args!(" ** Mulliken pop **"));
        for (index, population) in populations.iter().enumerate() {
            logger.note(format_args!("pop of basis function {index:<3} {population:.5}"));
        }
        logger.note(format_args!(
            "total energy = {:.12}  electronic = {:.12}  nuclear repulsion = {:.12}",
            output.total_energy(),
            output.electronic_energy,
            output.nuclear_repulsion
        ));
        Ok(())
    }

    /// Writes the current options to the output sink.
    pub fn dump_flags(&self) {
        let logger = self.logger();
        logger.info(format_args!("******** {} flags ********", Self::NAME));
        logger.info(format_args!("system = {}", self.core.system.name()));
        logger.info(format_args!("occupation = {:?}", self.occupation));
        self.controls.dump(&logger);
        logger.info(format_args!("max_memory = {}", self.core.defaults.max_memory));
    }
}

impl Handler for Rhf {
    fn system(&self) -> &Arc<ModelSystem> {
        &self.core.system
    }

    fn defaults(&self) -> Defaults {
        self.core.defaults.clone()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Restricted
    }

    fn restricted_reference(&self) -> Option<Arc<RestrictedHartreeFockOutput>> {
        self.core.slot.peek().cloned()
    }
}

impl Overrides for Rhf {
    fn local_defaults(&self) -> &Defaults {
        &self.core.defaults
    }

    fn local_defaults_mut(&mut self) -> &mut Defaults {
        &mut self.core.defaults
    }
}

impl Method for Rhf {
    type Output = RestrictedHartreeFockOutput;

    const NAME: &'static str = "RHF";

    fn kernel(&mut self) -> Result<Arc<Self::Output>> {
        self.kernel_with(None)
    }

    fn result(&self) -> Result<&Arc<Self::Output>> {
        self.core.slot.get(Self::NAME, "result")
    }

    fn state(&self) -> MethodState {
        self.core.slot.state()
    }
}

/// Runs a closed-shell scf iteration for `system`.
pub fn restricted_hartree_fock(
    system: &ModelSystem,
    controls: &ScfControls,
    occupation: Occupation,
    dm0: Option<&DMatrix<f64>>,
    logger: &Logger,
) -> Result<RestrictedHartreeFockOutput> {
    controls.validate()?;
    if system.spin() != 0 {
        return Err(ConfigurationError::InvalidSystem(format!(
            "restricted hartree fock needs a closed shell, got spin 2S = {}",
            system.spin()
        ))
        .into());
    }

    let start = std::time::Instant::now();
    let n_basis = system.n_basis();
    let n_electrons = system.n_electrons();

    let nuclear_repulsion = system.nuclear_repulsion();
    log::debug!("nuclear repulsion energy: {nuclear_repulsion}");

    let overlap = system.overlap();
    let core_hamiltonian = system.core_hamiltonian();
    let eri = system.eri();

    let transform = utils::orthogonalizer(overlap, controls.lindep_threshold)?;
    if transform.ncols() < n_electrons / 2 {
        return Err(ConfigurationError::InvalidSystem(format!(
            "{} linearly independent orbitals cannot hold {n_electrons} electrons",
            transform.ncols()
        ))
        .into());
    }

    let mut density = match dm0 {
        Some(dm0) => {
            check_density("initial density", dm0, n_basis)?;
            dm0.clone()
        }
        None => compute_hückel_density(core_hamiltonian, overlap, &transform, n_electrons),
    };

    let mut veff = restricted_veff(eri, &density);
    let mut energy = electronic_energy(&density, core_hamiltonian, &veff);
    logger.info(format_args!("init E= {:.15}", energy + nuclear_repulsion));
    let start = logger.timer("initial guess", start);

    let conv_tol_grad = controls.conv_tol_grad();
    let mut diis = Diis::new(controls.diis_space);
    let mut delta_energy = f64::INFINITY;
    let mut density_rms = f64::INFINITY;

    // start of scf iteration
    for cycle in 0..controls.max_cycle {
        let fock = core_hamiltonian + &veff;
        let error = &fock * &density * overlap - overlap * &density * &fock;
        let fock = diis.fock(error, fock);

        let (mo_coeff, mo_energy) = utils::roothaan(&fock, &transform);
        let mo_occ = occupation.restricted(&mo_energy, n_electrons, logger);

        let mut new_density = utils::density_from_orbitals(&mo_coeff, &mo_occ);
        if controls.damp > 0.0 {
            new_density = (1.0 - controls.damp) * new_density + controls.damp * &density;
        }

        density_rms = utils::density_rms(&(&new_density - &density));
        density = new_density;

        veff = restricted_veff(eri, &density);
        let new_energy = electronic_energy(&density, core_hamiltonian, &veff);
        delta_energy = new_energy - energy;
        energy = new_energy;

        logger.info(format_args!(
            "cycle= {:<3} E= {:.15}  delta_E= {delta_energy:.3e}  |ddm|= {density_rms:.3e}",
            cycle + 1,
            energy + nuclear_repulsion,
        ));

        if delta_energy.abs() < controls.conv_tol && density_rms < conv_tol_grad {
            logger.timer("scf iterations", start);
            logger.note(format_args!(
                "converged SCF energy = {:.15}",
                energy + nuclear_repulsion
            ));
            return Ok(RestrictedHartreeFockOutput {
                orbitals: Orbitals {
                    mo_energy,
                    mo_coeff,
                    mo_occ,
                },
                electronic_energy: energy,
                nuclear_repulsion,
                iterations: cycle + 1,
            });
        }
    }

    logger.warn(format_args!(
        "SCF not converged after {} cycles, SCF energy = {:.15}",
        controls.max_cycle,
        energy + nuclear_repulsion
    ));
    Err(Error::NotConverged {
        method: Rhf::NAME,
        cycles: controls.max_cycle,
        delta_energy,
        density_rms,
    })
}

fn compute_hückel_density(
    hamiltonian: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
    transform: &DMatrix<f64>,
    n_electrons: usize,
) -> DMatrix<f64> {
    const WOLFSBERG_HELMHOLTZ: f64 = 1.75;
    let n_basis = hamiltonian.nrows();
    let hamiltonian_eht = utils::symmetric_matrix(n_basis, |i, j| {
        if i == j {
            hamiltonian[(i, i)]
        } else {
            WOLFSBERG_HELMHOLTZ * overlap[(i, j)] * (hamiltonian[(i, i)] + hamiltonian[(j, j)])
                / 2.0
        }
    });

    let (coeffs, orbital_energies) = utils::roothaan(&hamiltonian_eht, transform);
    let occupations = Occupation::spin(&orbital_energies, n_electrons / 2) * 2.0;

    utils::density_from_orbitals(&coeffs, &occupations)
}
