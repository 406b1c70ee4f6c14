use nalgebra::DVector;

use crate::env::Logger;

/// How electrons are distributed over restricted orbitals.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Occupation {
    /// Doubly occupy the lowest orbitals.
    #[default]
    Aufbau,
    /// If the highest occupied and lowest unoccupied orbitals are degenerate
    /// within `tol`, spread the electrons of the degenerate shell evenly over it.
    Fractional { tol: f64 },
}

impl Occupation {
    /// Occupation numbers (0..=2) for `n_electrons` electrons in closed-shell orbitals
    /// with sorted energies `mo_energy`.
    pub(crate) fn restricted(
        self,
        mo_energy: &DVector<f64>,
        n_electrons: usize,
        logger: &Logger,
    ) -> DVector<f64> {
        let n_mo = mo_energy.len();
        let n_occupied = (n_electrons / 2).min(n_mo);

        let mut mo_occ = DVector::zeros(n_mo);
        mo_occ.rows_mut(0, n_occupied).fill(2.0);

        if let Occupation::Fractional { tol } = self {
            if n_occupied > 0
                && n_occupied < n_mo
                && (mo_energy[n_occupied - 1] - mo_energy[n_occupied]).abs() < tol
            {
                let homo = mo_energy[n_occupied - 1];
                let degenerate = |energy: f64| (energy - homo).abs() < tol;

                let n_shell = mo_energy.iter().filter(|&&e| degenerate(e)).count();
                let n_shell_occupied = mo_energy
                    .rows(0, n_occupied)
                    .iter()
                    .filter(|&&e| degenerate(e))
                    .count();
                let n_double = n_occupied - n_shell_occupied;

                let fraction = 2.0 * n_shell_occupied as f64 / n_shell as f64;
                mo_occ.rows_mut(n_double, n_shell).fill(fraction);
                logger.warn(format_args!(
                    "fraction occ = {fraction:6} [{n_double}:{}]",
                    n_double + n_shell
                ));
            }
        }

        log_frontier(mo_energy, n_occupied, logger);
        mo_occ
    }

    /// Occupation numbers (0 or 1) for `n_electrons` electrons of one spin.
    pub(crate) fn spin(mo_energy: &DVector<f64>, n_electrons: usize) -> DVector<f64> {
        let n_mo = mo_energy.len();
        let mut mo_occ = DVector::zeros(n_mo);
        mo_occ.rows_mut(0, n_electrons.min(n_mo)).fill(1.0);
        mo_occ
    }
}

fn log_frontier(mo_energy: &DVector<f64>, n_occupied: usize, logger: &Logger) {
    match n_occupied {
        0 => {}
        n if n < mo_energy.len() => logger.info(format_args!(
            "HOMO = {:.12}  LUMO = {:.12}",
            mo_energy[n - 1],
            mo_energy[n]
        )),
        n => logger.info(format_args!("HOMO = {:.12}", mo_energy[n - 1])),
    }
    logger.debug(format_args!("  mo_energy = {:?}", mo_energy.as_slice()));
}
