//! Second-order Møller-Plesset correlation energy on top of a restricted
//! hartree fock reference.
//!
//!   E(2) = sum_ijab (ia|jb) [2 (ia|jb) - (ib|ja)] / (e_i + e_j - e_a - e_b)

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::{
    env::{Defaults, Logger, MaxMemory},
    error::{ConfigurationError, Result},
    hf::{electronic_energy, restricted_veff, Orbitals, RestrictedHartreeFockOutput},
    integrals::{ao2mo, ElectronTensor},
    method::{missing, Handler, HandlerKind, Method, MethodCore, MethodState, Overrides},
    system::{ModelSystem, ProblemSize},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Mp2Output {
    /// The second order correlation energy
    pub e_corr: f64,
    /// Total energy of the reference determinant
    pub e_hf: f64,
    /// Number of correlated occupied orbitals
    pub n_occupied: usize,
    pub n_virtual: usize,
}

impl Mp2Output {
    pub fn total_energy(&self) -> f64 {
        self.e_hf + self.e_corr
    }
}

/// Where the reference orbitals come from.
#[derive(Debug)]
enum Reference {
    Missing,
    /// The cached result of the handler at construction time.
    Shared(Arc<RestrictedHartreeFockOutput>),
    Explicit(Orbitals),
}

impl Reference {
    fn orbitals(&self) -> Option<&Orbitals> {
        match self {
            Reference::Missing => None,
            Reference::Shared(output) => Some(&output.orbitals),
            Reference::Explicit(orbitals) => Some(orbitals),
        }
    }
}

#[derive(Debug)]
pub struct Mp2 {
    core: MethodCore<Mp2Output>,
    reference: Reference,
    frozen: usize,
}

impl Mp2 {
    /// Builds MP2 on top of `handler`. If the handler already holds a restricted
    /// solution it becomes the reference; later solves of the handler are not seen.
    pub fn new(handler: &(impl Handler + ?Sized)) -> Result<Self> {
        if handler.kind() == HandlerKind::Unrestricted {
            return Err(ConfigurationError::IncompatibleHandler {
                method: Self::NAME,
                reason: "an unrestricted reference is not supported".to_string(),
            }
            .into());
        }

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

        let reference = match handler.restricted_reference() {
            Some(output) => Reference::Shared(output),
            None => Reference::Missing,
        };

        Ok(Self {
            core,
            reference,
            frozen: 0,
        })
    }

    /// Builds MP2 on explicitly given reference orbitals.
    pub fn with_reference(handler: &(impl Handler + ?Sized), orbitals: Orbitals) -> Result<Self> {
        let mut mp2 = Self::new(handler)?;
        orbitals.check(mp2.core.size.n_basis)?;
        mp2.reference = Reference::Explicit(orbitals);
        Ok(mp2)
    }

    pub fn size(&self) -> ProblemSize {
        self.core.size
    }

    /// The reference orbitals `kernel` uses, if there are any.
    pub fn reference(&self) -> Option<&Orbitals> {
        self.reference.orbitals()
    }

    pub fn frozen(&self) -> usize {
        self.frozen
    }

    /// Excludes the `frozen` lowest occupied orbitals from the correlation treatment.
    pub fn set_frozen(&mut self, frozen: usize) -> &mut Self {
        if frozen != self.frozen {
            self.frozen = frozen;
            self.core.slot.mark_stale();
        }
        self
    }

    fn logger(&self) -> Logger<'_> {
        self.core.defaults.logger("qchem::mp2")
    }

    /// Computes the correlation energy for `orbitals`, or for the reference if
    /// none are given.
    pub fn kernel_with(&mut self, orbitals: Option<&Orbitals>) -> Result<Arc<Mp2Output>> {
        self.dump_flags();

        let orbitals = match orbitals {
            Some(orbitals) => {
                orbitals.check(self.core.size.n_basis)?;
                orbitals
            }
            None => self
                .reference
                .orbitals()
                .ok_or_else(|| missing(Self::NAME, "kernel"))?,
        };

        let output = mp2_energy(
            &self.core.system,
            orbitals,
            self.frozen,
            self.core.defaults.max_memory,
            &self.logger(),
        )?;
        Ok(self.core.slot.install(output))
    }

    pub fn dump_flags(&self) {
        let logger = self.logger();
        logger.info(format_args!("******** {} flags ********", Self::NAME));
        logger.info(format_args!("system = {}", self.core.system.name()));
        logger.info(format_args!("frozen orbitals = {}", self.frozen));
        logger.info(format_args!(
            "reference = {}",
            match self.reference {
                Reference::Missing => "none",
                Reference::Shared(_) => "handler",
                Reference::Explicit(_) => "explicit",
            }
        ));
        logger.info(format_args!("max_memory = {}", self.core.defaults.max_memory));
    }
}

impl Handler for Mp2 {
    fn system(&self) -> &Arc<ModelSystem> {
        &self.core.system
    }

    fn defaults(&self) -> Defaults {
        self.core.defaults.clone()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Correlated
    }

    fn restricted_reference(&self) -> Option<Arc<RestrictedHartreeFockOutput>> {
        match &self.reference {
            Reference::Shared(output) => Some(Arc::clone(output)),
            _ => None,
        }
    }
}

impl Overrides for Mp2 {
    fn local_defaults(&self) -> &Defaults {
        &self.core.defaults
    }

    fn local_defaults_mut(&mut self) -> &mut Defaults {
        &mut self.core.defaults
    }
}

impl Method for Mp2 {
    type Output = Mp2Output;

    const NAME: &'static str = "MP2";

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

/// Coefficients and energies of the selected orbitals.
fn select(orbitals: &Orbitals, indices: &[usize]) -> (DMatrix<f64>, DVector<f64>) {
    let n_basis = orbitals.n_basis();
    let coefficients = DMatrix::from_fn(n_basis, indices.len(), |row, column| {
        orbitals.mo_coeff[(row, indices[column])]
    });
    let energies = DVector::from_fn(indices.len(), |index, _| orbitals.mo_energy[indices[index]]);
    (coefficients, energies)
}

/// Contribution of occupied orbital `i`, given its (ia|jb) slice with rows `a`
/// and columns `j * n_virtual + b`.
fn pair_energy(i: usize, slice: &DMatrix<f64>, e_occ: &DVector<f64>, e_vir: &DVector<f64>) -> f64 {
    let n_virtual = e_vir.len();
    let mut energy = 0.0;
    for (j, a, b) in itertools::iproduct!(0..e_occ.len(), 0..n_virtual, 0..n_virtual) {
        let iajb = slice[(a, j * n_virtual + b)];
        let ibja = slice[(b, j * n_virtual + a)];
        energy += iajb * (2.0 * iajb - ibja) / (e_occ[i] + e_occ[j] - e_vir[a] - e_vir[b]);
    }
    energy
}

fn reference_energy(system: &ModelSystem, eri: &ElectronTensor, orbitals: &Orbitals) -> f64 {
    let density = orbitals.density();
    let veff = restricted_veff(eri, &density);
    electronic_energy(&density, system.core_hamiltonian(), &veff) + system.nuclear_repulsion()
}

fn mp2_energy(
    system: &ModelSystem,
    orbitals: &Orbitals,
    frozen: usize,
    max_memory: MaxMemory,
    logger: &Logger,
) -> Result<Mp2Output> {
    let start = std::time::Instant::now();
    let eri = system.eri();
    let n_basis = system.n_basis();

    let occupied = orbitals
        .mo_occ
        .iter()
        .enumerate()
        .filter(|(_, &occ)| occ > 0.0)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let virtual_ = orbitals
        .mo_occ
        .iter()
        .enumerate()
        .filter(|(_, &occ)| occ == 0.0)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    if frozen > occupied.len() {
        return Err(ConfigurationError::InvalidControl {
            name: "frozen",
            value: frozen as f64,
        }
        .into());
    }
    let active = &occupied[frozen..];

    let (c_occ, e_occ) = select(orbitals, active);
    let (c_vir, e_vir) = select(orbitals, &virtual_);
    let (n_occupied, n_virtual) = (active.len(), virtual_.len());
    logger.info(format_args!(
        "{n_occupied} correlated occupied and {n_virtual} virtual orbitals"
    ));

    let shape = [n_occupied, n_virtual, n_occupied, n_virtual];
    let available = max_memory.megabytes();

    let mut e_corr = 0.0;
    if n_occupied > 0 && n_virtual > 0 {
        if ao2mo::block_memory(n_basis, shape) <= available {
            // rows i * n_virtual + a, columns j * n_virtual + b
            let ovov = ao2mo::general(eri, [&c_occ, &c_vir, &c_occ, &c_vir]);
            for i in 0..n_occupied {
                let slice = ovov.rows(i * n_virtual, n_virtual).into_owned();
                e_corr += pair_energy(i, &slice, &e_occ, &e_vir);
            }
        } else {
            let required = ao2mo::slice_memory(n_basis, shape);
            if required > available {
                return Err(ConfigurationError::InsufficientMemory {
                    required,
                    available,
                }
                .into());
            }

            logger.note(format_args!(
                "(ov|ov) block does not fit into {max_memory}, transforming one occupied orbital at a time"
            ));
            for i in 0..n_occupied {
                let coefficients = c_occ.column(i).iter().copied().collect::<Vec<_>>();
                let slice = ao2mo::orbital_slice(eri, &coefficients, &c_vir, &c_occ, &c_vir);
                e_corr += pair_energy(i, &slice, &e_occ, &e_vir);
            }
        }
    }
    logger.timer("mp2 energy", start);

    let e_hf = reference_energy(system, eri, orbitals);
    logger.note(format_args!(
        "E(MP2) = {:.15}  E_corr = {e_corr:.15}",
        e_hf + e_corr
    ));

    Ok(Mp2Output {
        e_corr,
        e_hf,
        n_occupied,
        n_virtual,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        env::{Environment, OutputSink, Verbosity},
        hf::{Rhf, Uhf},
        testing,
    };

    fn quiet(system: ModelSystem) -> Environment {
        let mut env = Environment::new(system);
        env.set_verbosity(Verbosity::Quiet);
        env
    }

    fn solved_rhf(env: &Environment) -> Rhf {
        let mut rhf = Rhf::new(env).unwrap();
        rhf.kernel().unwrap();
        rhf
    }

    #[test]
    fn hydrogen_correlation_energy() {
        let env = quiet(testing::h2_sto3g());
        let rhf = solved_rhf(&env);

        let mut mp2 = Mp2::new(&rhf).unwrap();
        let output = mp2.kernel().unwrap();

        // K_gu^2 / 2(e_g - e_u)
        assert_relative_eq!(output.e_corr, -0.0132, epsilon = 1e-3);
        assert_relative_eq!(
            output.e_hf,
            rhf.result().unwrap().total_energy(),
            epsilon = 1e-8
        );
        assert_eq!((output.n_occupied, output.n_virtual), (1, 1));
    }

    #[test]
    fn hydrogen_chain_correlation_energy() {
        let env = quiet(testing::h4_sto3g());
        let rhf = solved_rhf(&env);
        let mut mp2 = Mp2::new(&rhf).unwrap();

        let output = mp2.kernel().unwrap();
        assert_relative_eq!(output.e_corr, -0.027919553, epsilon = 1e-7);
        assert_relative_eq!(output.e_hf, -2.204373007, epsilon = 1e-7);
        assert_eq!((output.n_occupied, output.n_virtual), (2, 2));

        mp2.set_frozen(1);
        let frozen = mp2.kernel().unwrap();
        assert_relative_eq!(frozen.e_corr, -0.009339984, epsilon = 1e-7);
        assert_eq!(frozen.n_occupied, 1);
    }

    #[test]
    fn correlation_lowers_the_energy() {
        let env = quiet(testing::heh_sto3g());
        let rhf = solved_rhf(&env);

        let output = Mp2::new(&rhf).unwrap().kernel().unwrap();

        assert!(output.e_corr < 0.0);
        assert!(output.total_energy() < output.e_hf);
    }

    #[test]
    fn unrestricted_handlers_are_rejected() {
        let env = quiet(testing::h2_sto3g());
        let uhf = Uhf::new(&env).unwrap();

        let err = Mp2::new(&uhf).unwrap_err();
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::IncompatibleHandler { method: "MP2", .. })
        ));
    }

    #[test]
    fn missing_reference_is_reported() {
        let env = quiet(testing::h2_sto3g());
        let rhf = Rhf::new(&env).unwrap();

        let mut from_env = Mp2::new(&env).unwrap();
        let mut from_unsolved = Mp2::new(&rhf).unwrap();

        assert!(from_env.kernel().unwrap_err().is_missing_result());
        assert!(from_unsolved.kernel().unwrap_err().is_missing_result());
        assert!(from_env.result().unwrap_err().is_missing_result());
    }

    #[test]
    fn reference_is_snapshotted_at_construction() {
        let env = quiet(testing::h2_sto3g());
        let mut rhf = Rhf::new(&env).unwrap();
        let first = rhf.kernel().unwrap();

        let mp2 = Mp2::new(&rhf).unwrap();
        rhf.kernel().unwrap();

        assert!(Arc::ptr_eq(&mp2.restricted_reference().unwrap(), &first));
    }

    #[test]
    fn explicit_orbitals_are_validated() {
        let env = quiet(testing::h2_sto3g());
        let orbitals = solved_rhf(&env).result().unwrap().orbitals.clone();

        let mut mp2 = Mp2::with_reference(&env, orbitals.clone()).unwrap();
        assert!(mp2.kernel().is_ok());

        let mut broken = orbitals;
        broken.mo_coeff = DMatrix::identity(3, 2);
        assert!(Mp2::with_reference(&env, broken.clone()).is_err());
        assert!(mp2.kernel_with(Some(&broken)).is_err());
        assert_eq!(mp2.state(), MethodState::Solved);
    }

    #[test]
    fn sliced_transformation_matches_incore() {
        let env = quiet(testing::heh_sto3g());
        let rhf = solved_rhf(&env);

        let incore = Mp2::new(&rhf).unwrap().kernel().unwrap();

        let sink = OutputSink::memory();
        let mut sliced = Mp2::new(&rhf).unwrap();
        let budget = ao2mo::slice_memory(2, [1, 1, 1, 1]);
        sliced
            .set_verbosity(Verbosity::Note)
            .set_output(sink.clone())
            .set_max_memory(budget)
            .unwrap();

        let output = sliced.kernel().unwrap();

        assert_relative_eq!(output.e_corr, incore.e_corr, epsilon = 1e-12);
        assert!(sink.contents().unwrap().contains("one occupied orbital at a time"));
    }

    #[test]
    fn sliced_transformation_matches_incore_for_several_occupied() {
        let env = quiet(testing::h4_sto3g());
        let rhf = solved_rhf(&env);

        let incore = Mp2::new(&rhf).unwrap().kernel().unwrap();

        let mut sliced = Mp2::new(&rhf).unwrap();
        sliced
            .set_max_memory(ao2mo::slice_memory(4, [2, 2, 2, 2]))
            .unwrap();
        let output = sliced.kernel().unwrap();

        assert_relative_eq!(output.e_corr, incore.e_corr, epsilon = 1e-12);
        assert_relative_eq!(output.e_corr, -0.027919553, epsilon = 1e-7);
    }

    #[test]
    fn too_small_budget_is_rejected() {
        let env = quiet(testing::heh_sto3g());
        let rhf = solved_rhf(&env);

        let mut mp2 = Mp2::new(&rhf).unwrap();
        mp2.set_max_memory(ao2mo::slice_memory(2, [1, 1, 1, 1]) / 2.0)
            .unwrap();

        let err = mp2.kernel().unwrap_err();
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::InsufficientMemory { .. })
        ));
        assert_eq!(mp2.state(), MethodState::Configured);
    }

    #[test]
    fn freezing_every_occupied_orbital_leaves_no_correlation() {
        let env = quiet(testing::h2_sto3g());
        let rhf = solved_rhf(&env);
        let mut mp2 = Mp2::new(&rhf).unwrap();

        mp2.set_frozen(1);
        assert_eq!(mp2.kernel().unwrap().e_corr, 0.0);
        mp2.set_frozen(1);
        assert_eq!(mp2.state(), MethodState::Solved);

        mp2.set_frozen(2);
        assert_eq!(mp2.state(), MethodState::Stale);
        assert!(mp2.kernel().is_err());
    }
}
