use nalgebra::DMatrix;

use crate::integrals::ElectronTensor;

use super::utils;

/// Coulomb and exchange matrices of a density matrix:
///   J[i,j] = sum_kl D[k,l] (ij|kl)
///   K[i,j] = sum_kl D[k,l] (ik|jl)
pub fn get_jk(eri: &ElectronTensor, density: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
    let n_basis = density.nrows();

    let coulomb = utils::symmetric_matrix(n_basis, |i, j| {
        let mut sum = 0.0;
        for (k, l) in itertools::iproduct!(0..n_basis, 0..n_basis) {
            sum += density[(k, l)] * eri[(i, j, k, l)];
        }
        sum
    });

    let exchange = utils::symmetric_matrix(n_basis, |i, j| {
        let mut sum = 0.0;
        for (k, l) in itertools::iproduct!(0..n_basis, 0..n_basis) {
            sum += density[(k, l)] * eri[(i, k, j, l)];
        }
        sum
    });

    (coulomb, exchange)
}

/// Closed-shell effective potential `J - K/2` of a total density.
pub fn restricted_veff(eri: &ElectronTensor, density: &DMatrix<f64>) -> DMatrix<f64> {
    let (coulomb, exchange) = get_jk(eri, density);
    coulomb - 0.5 * exchange
}

/// Open-shell effective potentials `J(Da + Db) - K(Ds)` for both spins.
pub fn unrestricted_veff(
    eri: &ElectronTensor,
    densities: &[DMatrix<f64>; 2],
) -> [DMatrix<f64>; 2] {
    let (coulomb_alpha, exchange_alpha) = get_jk(eri, &densities[0]);
    let (coulomb_beta, exchange_beta) = get_jk(eri, &densities[1]);
    let coulomb = coulomb_alpha + coulomb_beta;

    [&coulomb - exchange_alpha, coulomb - exchange_beta]
}
