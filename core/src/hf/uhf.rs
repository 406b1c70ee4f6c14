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
    check_density, electronic_energy, mulliken_populations, unrestricted_veff, utils, Occupation,
    Orbitals, ScfControls,
};

/// The output of an unrestricted hartree fock calculation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub struct UnrestrictedHartreeFockOutput {
    /// The spin up and spin down orbitals, each sorted by ascending energy.
    pub orbitals: [Orbitals; 2],
    /// The electronic energy of the system
    pub electronic_energy: f64,
    /// The nuclear repulsion energy
    pub nuclear_repulsion: f64,
    /// After how many iterations did the system converge
    pub iterations: usize,
}

impl UnrestrictedHartreeFockOutput {
    pub fn total_energy(&self) -> f64 {
        self.electronic_energy + self.nuclear_repulsion
    }

    pub fn alpha(&self) -> &Orbitals {
        &self.orbitals[0]
    }

    pub fn beta(&self) -> &Orbitals {
        &self.orbitals[1]
    }
}

/// Open-shell hartree fock with separate spin up and spin down orbitals.
#[derive(Debug)]
pub struct Uhf {
    core: MethodCore<UnrestrictedHartreeFockOutput>,
    controls: ScfControls,
}

impl Uhf {
    pub fn new(handler: &(impl Handler + ?Sized)) -> Result<Self> {
        Ok(Self {
            core: MethodCore::new(handler),
            controls: ScfControls::default(),
        })
    }

    pub fn size(&self) -> ProblemSize {
        self.core.size
    }

    pub fn controls(&self) -> &ScfControls {
        &self.controls
    }

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

    fn logger(&self) -> Logger<'_> {
        self.core.defaults.logger("qchem::uhf")
    }

    /// Runs the scf iteration, starting from the spin densities `dm0` if given and
    /// from the core hamiltonian guess otherwise.
    pub fn kernel_with(
        &mut self,
        dm0: Option<&[DMatrix<f64>; 2]>,
    ) -> Result<Arc<UnrestrictedHartreeFockOutput>> {
        self.dump_flags();
        let output =
            unrestricted_hartree_fock(&self.core.system, &self.controls, dm0, &self.logger())?;
        Ok(self.core.slot.install(output))
    }

    fn orbitals_or_result<'a>(
        &'a self,
        orbitals: Option<&'a [Orbitals; 2]>,
        operation: &'static str,
    ) -> Result<&'a [Orbitals; 2]> {
        match orbitals {
            Some(orbitals) => {
                for spin in orbitals {
                    spin.check(self.core.size.n_basis)?;
                }
                Ok(orbitals)
            }
            None => Ok(&self.core.slot.get(Self::NAME, operation)?.orbitals),
        }
    }

    fn densities_or_result(&self, densities: Option<&[DMatrix<f64>; 2]>) -> Result<[DMatrix<f64>; 2]> {
        match densities {
            Some(densities) => {
                for density in densities {
                    check_density("spin density", density, self.core.size.n_basis)?;
                }
                Ok(densities.clone())
            }
            None => self.make_rdm1(None),
        }
    }

    /// The spin up and spin down density matrices.
    pub fn make_rdm1(&self, orbitals: Option<&[Orbitals; 2]>) -> Result<[DMatrix<f64>; 2]> {
        let [alpha, beta] = self.orbitals_or_result(orbitals, "make_rdm1")?;
        Ok([alpha.density(), beta.density()])
    }

    pub fn energy_elec(&self, densities: Option<&[DMatrix<f64>; 2]>) -> Result<f64> {
        let densities = self.densities_or_result(densities)?;
        let system = &self.core.system;
        Ok(uhf_energy(
            &densities,
            system.core_hamiltonian(),
            &unrestricted_veff(system.eri(), &densities),
        ))
    }

    pub fn energy_tot(&self, densities: Option<&[DMatrix<f64>; 2]>) -> Result<f64> {
        Ok(self.energy_elec(densities)? + self.core.system.nuclear_repulsion())
    }

    /// `<S^2>` and the spin multiplicity `2S + 1` of the determinant.
    pub fn spin_square(&self, orbitals: Option<&[Orbitals; 2]>) -> Result<(f64, f64)> {
        let [alpha, beta] = self.orbitals_or_result(orbitals, "spin_square")?;
        Ok(spin_square(alpha, beta, self.core.system.overlap()))
    }

    /// Mulliken populations of the spin up and spin down densities.
    pub fn mulliken_pop(
        &self,
        densities: Option<&[DMatrix<f64>; 2]>,
    ) -> Result<[DVector<f64>; 2]> {
        let [alpha, beta] = self.densities_or_result(densities)?;
        let overlap = self.core.system.overlap();
        Ok([
            mulliken_populations(&alpha, overlap),
            mulliken_populations(&beta, overlap),
        ])
    }

    pub fn analyze(&self) -> Result<()> {
        let output = self.core.slot.get(Self::NAME, "analyze")?;
        let logger = self.logger();

        output.alpha().analyze(" for alpha spin", &logger);
        output.beta().analyze(" for beta spin", &logger);

        let [alpha, beta] = self.mulliken_pop(None)?;
        logger.note(format_args!(" ** Mulliken pop       alpha | beta **"));
        for (index, (a, b)) in alpha.iter().zip(beta.iter()).enumerate() {
            logger.note(format_args!(
                "pop of basis function {index:<3} {a:.5} | {b:.5}"
            ));
        }

        let (ss, multiplicity) = spin_square(output.alpha(), output.beta(), self.core.system.overlap());
        logger.note(format_args!("<S^2> = {ss:.8}  2S+1 = {multiplicity:.8}"));
        logger.note(format_args!(
            "total energy = {:.12}  electronic = {:.12}  nuclear repulsion = {:.12}",
            output.total_energy(),
            output.electronic_energy,
            output.nuclear_repulsion
        ));
        Ok(())
    }

    pub fn dump_flags(&self) {
        let logger = self.logger();
        let size = self.core.size;
        logger.info(format_args!("******** {} flags ********", Self::NAME));
        logger.info(format_args!("system = {}", self.core.system.name()));
        logger.info(format_args!(
            "number of electrons per spin = ({}, {})",
            size.n_alpha, size.n_beta
        ));
        self.controls.dump(&logger);
        logger.info(format_args!("max_memory = {}", self.core.defaults.max_memory));
    }
}

impl Handler for Uhf {
    fn system(&self) -> &Arc<ModelSystem> {
        &self.core.system
    }

    fn defaults(&self) -> Defaults {
        self.core.defaults.clone()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Unrestricted
    }
}

impl Overrides for Uhf {
    fn local_defaults(&self) -> &Defaults {
        &self.core.defaults
    }

    fn local_defaults_mut(&mut self) -> &mut Defaults {
        &mut self.core.defaults
    }
}

impl Method for Uhf {
    type Output = UnrestrictedHartreeFockOutput;

    const NAME: &'static str = "UHF";

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

fn uhf_energy(
    densities: &[DMatrix<f64>; 2],
    core_hamiltonian: &DMatrix<f64>,
    veffs: &[DMatrix<f64>; 2],
) -> f64 {
    electronic_energy(&densities[0], core_hamiltonian, &veffs[0])
        + electronic_energy(&densities[1], core_hamiltonian, &veffs[1])
}

fn spin_square(alpha: &Orbitals, beta: &Orbitals, overlap: &DMatrix<f64>) -> (f64, f64) {
    let occupied = |orbitals: &Orbitals| {
        let columns = orbitals
            .mo_occ
            .iter()
            .enumerate()
            .filter(|(_, &occ)| occ > 0.0)
            .map(|(index, _)| orbitals.mo_coeff.column(index).into_owned())
            .collect::<Vec<_>>();
        if columns.is_empty() {
            DMatrix::zeros(orbitals.n_basis(), 0)
        } else {
            DMatrix::from_columns(&columns)
        }
    };

    let (occupied_alpha, occupied_beta) = (occupied(alpha), occupied(beta));
    let n_alpha = occupied_alpha.ncols() as f64;
    let n_beta = occupied_beta.ncols() as f64;

    let mixed_overlap = occupied_alpha.transpose() * overlap * occupied_beta;
    let ss_xy = (n_alpha + n_beta) * 0.5 - mixed_overlap.norm_squared();
    let ss_z = (n_beta - n_alpha).powi(2) * 0.25;
    let ss = ss_xy + ss_z;

    let s = (ss + 0.25).sqrt() - 0.5;
    (ss, 2.0 * s + 1.0)
}

/// Runs an open-shell scf iteration for `system`.
pub fn unrestricted_hartree_fock(
    system: &ModelSystem,
    controls: &ScfControls,
    dm0: Option<&[DMatrix<f64>; 2]>,
    logger: &Logger,
) -> Result<UnrestrictedHartreeFockOutput> {
    controls.validate()?;

    let start = std::time::Instant::now();
    let n_basis = system.n_basis();
    let n_electrons = [system.n_alpha(), system.n_beta()];

    let nuclear_repulsion = system.nuclear_repulsion();
    log::debug!("nuclear repulsion energy: {nuclear_repulsion}");

    let overlap = system.overlap();
    let core_hamiltonian = system.core_hamiltonian();
    let eri = system.eri();

    let transform = utils::orthogonalizer(overlap, controls.lindep_threshold)?;
    if transform.ncols() < n_electrons[0] {
        return Err(ConfigurationError::InvalidSystem(format!(
            "{} linearly independent orbitals cannot hold {} alpha electrons",
            transform.ncols(),
            n_electrons[0]
        ))
        .into());
    }

    let mut densities = match dm0 {
        Some(dm0) => {
            for density in dm0 {
                check_density("initial spin density", density, n_basis)?;
            }
            dm0.clone()
        }
        None => {
            let (coeffs, orbital_energies) = utils::roothaan(core_hamiltonian, &transform);
            n_electrons.map(|n| {
                utils::density_from_orbitals(&coeffs, &Occupation::spin(&orbital_energies, n))
            })
        }
    };

    let mut veffs = unrestricted_veff(eri, &densities);
    let mut energy = uhf_energy(&densities, core_hamiltonian, &veffs);
    logger.info(format_args!("init E= {:.15}", energy + nuclear_repulsion));
    let start = logger.timer("initial guess", start);

    let conv_tol_grad = controls.conv_tol_grad();
    let mut diis = [Diis::new(controls.diis_space), Diis::new(controls.diis_space)];
    let mut delta_energy = f64::INFINITY;
    let mut density_rms = f64::INFINITY;

    for cycle in 0..controls.max_cycle {
        let solutions = [0, 1].map(|spin| {
            let density = &densities[spin];
            let fock = core_hamiltonian + &veffs[spin];
            let error = &fock * density * overlap - overlap * density * &fock;
            let fock = diis[spin].fock(error, fock);

            let (mo_coeff, mo_energy) = utils::roothaan(&fock, &transform);
            let mo_occ = Occupation::spin(&mo_energy, n_electrons[spin]);
            Orbitals {
                mo_energy,
                mo_coeff,
                mo_occ,
            }
        });

        let mut new_densities = [solutions[0].density(), solutions[1].density()];
        if controls.damp > 0.0 {
            for (new, old) in new_densities.iter_mut().zip(densities.iter()) {
                *new = (1.0 - controls.damp) * &*new + controls.damp * old;
            }
        }

        density_rms = utils::density_rms(&(&new_densities[0] - &densities[0]))
            .max(utils::density_rms(&(&new_densities[1] - &densities[1])));
        densities = new_densities;

        veffs = unrestricted_veff(eri, &densities);
        let new_energy = uhf_energy(&densities, core_hamiltonian, &veffs);
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

            return Ok(UnrestrictedHartreeFockOutput {
                orbitals: solutions,
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
        method: Uhf::NAME,
        cycles: controls.max_cycle,
        delta_energy,
        density_rms,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        env::{Environment, OutputSink, Verbosity},
        hf::Rhf,
        testing,
    };

    fn quiet(system: ModelSystem) -> Environment {
        let mut env = Environment::new(system);
        env.set_verbosity(Verbosity::Quiet);
        env
    }

    #[test]
    fn closed_shell_matches_restricted() {
        let env = quiet(testing::heh_sto3g());
        let restricted = Rhf::new(&env).unwrap().kernel().unwrap();

        let mut uhf = Uhf::new(&env).unwrap();
        let unrestricted = uhf.kernel().unwrap();

        assert_relative_eq!(
            unrestricted.total_energy(),
            restricted.total_energy(),
            epsilon = 1e-7
        );
        assert_relative_eq!(
            unrestricted.alpha().mo_energy,
            unrestricted.beta().mo_energy,
            epsilon = 1e-6
        );

        let (ss, multiplicity) = uhf.spin_square(None).unwrap();
        assert_relative_eq!(ss, 0.0, epsilon = 1e-8);
        assert_relative_eq!(multiplicity, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn closed_shell_chain_matches_restricted() {
        let env = quiet(testing::h4_sto3g());
        let mut uhf = Uhf::new(&env).unwrap();

        let output = uhf.kernel().unwrap();

        assert_relative_eq!(output.total_energy(), -2.204373007, epsilon = 1e-7);
        assert_relative_eq!(uhf.spin_square(None).unwrap().0, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn unchanged_controls_keep_the_result_current() {
        let env = quiet(testing::h2_sto3g_triplet());
        let mut uhf = Uhf::new(&env).unwrap();
        uhf.kernel().unwrap();

        let max_cycle = uhf.controls().max_cycle;
        uhf.set_max_cycle(max_cycle);
        uhf.set_controls(*uhf.controls()).unwrap();
        assert_eq!(uhf.state(), MethodState::Solved);

        uhf.set_max_cycle(max_cycle + 10);
        assert_eq!(uhf.state(), MethodState::Stale);
    }

    #[test]
    fn hydrogen_triplet() {
        let env = quiet(testing::h2_sto3g_triplet());
        let mut uhf = Uhf::new(&env).unwrap();

        let output = uhf.kernel().unwrap();

        // both spatial orbitals are singly occupied: h_gg + h_uu + J_gu - K_gu
        assert_relative_eq!(output.electronic_energy, -1.2460, epsilon = 2e-3);
        assert_eq!(output.alpha().mo_occ.as_slice(), &[1.0, 1.0]);
        assert_eq!(output.beta().mo_occ.as_slice(), &[0.0, 0.0]);

        let (ss, multiplicity) = uhf.spin_square(None).unwrap();
        assert_relative_eq!(ss, 2.0, epsilon = 1e-8);
        assert_relative_eq!(multiplicity, 3.0, epsilon = 1e-8);
    }

    #[test]
    fn populations_split_by_spin() {
        let env = quiet(testing::h2_sto3g_triplet());
        let mut uhf = Uhf::new(&env).unwrap();
        uhf.kernel().unwrap();

        let [alpha, beta] = uhf.mulliken_pop(None).unwrap();
        assert_relative_eq!(alpha.sum(), 2.0, epsilon = 1e-10);
        assert_relative_eq!(beta.sum(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn results_are_required_unless_passed_explicitly() {
        let env = quiet(testing::h2_sto3g());
        let uhf = Uhf::new(&env).unwrap();

        assert!(uhf.make_rdm1(None).unwrap_err().is_missing_result());
        assert!(uhf.spin_square(None).unwrap_err().is_missing_result());
        assert!(uhf.analyze().unwrap_err().is_missing_result());

        let densities = [DMatrix::identity(2, 2), DMatrix::zeros(2, 2)];
        assert!(uhf.energy_tot(Some(&densities)).is_ok());
    }

    #[test]
    fn zero_cycles_never_converge() {
        let env = quiet(testing::h2_sto3g());
        let mut uhf = Uhf::new(&env).unwrap();
        uhf.set_max_cycle(0);

        assert!(uhf.kernel().unwrap_err().is_not_converged());
        assert_eq!(uhf.state(), MethodState::Configured);
    }

    #[test]
    fn unrestricted_handlers_provide_no_restricted_reference() {
        let env = quiet(testing::h2_sto3g());
        let mut uhf = Uhf::new(&env).unwrap();
        uhf.kernel().unwrap();

        assert_eq!(uhf.kind(), HandlerKind::Unrestricted);
        assert!(uhf.restricted_reference().is_none());
    }

    #[test]
    fn analyze_reports_spin_contamination() {
        let sink = OutputSink::memory();
        let mut env = Environment::new(testing::h2_sto3g_triplet());
        env.set_verbosity(Verbosity::Note).set_output(sink.clone());

        let mut uhf = Uhf::new(&env).unwrap();
        uhf.kernel().unwrap();
        uhf.analyze().unwrap();

        let log = sink.contents().unwrap();
        assert!(log.contains("MO energy for alpha spin"));
        assert!(log.contains("<S^2> = 2.0"));
    }
}
