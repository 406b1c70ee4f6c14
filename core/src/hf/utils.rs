use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::{ConfigurationError, Result};

#[inline(always)]
/// Create a symmetric, square matrix. Function is only run for upper triangle of the matrix
pub(crate) fn symmetric_matrix(
    n: usize,
    mut func: impl FnMut(usize, usize) -> f64,
) -> DMatrix<f64> {
    let m = DMatrix::from_fn(n, n, |i, j| if i <= j { func(i, j) } else { 0.0 });
    DMatrix::from_fn(n, n, |i, j| if i <= j { m[(i, j)] } else { m[(j, i)] })
}

pub(super) fn eigs(matrix: DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let eigs = SymmetricEigen::new(matrix);
    (eigs.eigenvectors, eigs.eigenvalues)
}

pub(super) fn sorted_eigs(matrix: DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let (eigenvectors, eigenvalues) = eigs(matrix);

    let mut val_vec_pairs = eigenvalues
        .iter()
        .copied()
        .zip(eigenvectors.column_iter())
        .collect::<Vec<_>>();

    // stable, so degenerate orbitals keep the solver's order between calls
    val_vec_pairs.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    let (values, vectors): (Vec<_>, Vec<_>) = val_vec_pairs.into_iter().unzip();

    (
        DMatrix::from_columns(&vectors),
        DVector::from_vec(values),
    )
}

/// Canonical orthogonalization: `X` with `X^T S X = 1`, dropping directions whose
/// overlap eigenvalue is below `threshold`. The number of columns of `X` is the
/// number of linearly independent orbitals.
pub(super) fn orthogonalizer(overlap: &DMatrix<f64>, threshold: f64) -> Result<DMatrix<f64>> {
    let (vectors, values) = sorted_eigs(overlap.clone());

    let kept = values
        .iter()
        .enumerate()
        .filter(|(_, &value)| value > threshold)
        .map(|(index, &value)| vectors.column(index) / value.sqrt())
        .collect::<Vec<_>>();

    if kept.is_empty() {
        return Err(ConfigurationError::InvalidSystem(format!(
            "every overlap eigenvalue is below the linear dependency threshold {threshold}"
        ))
        .into());
    }

    let dropped = overlap.nrows() - kept.len();
    if dropped > 0 {
        log::debug!("removed {dropped} linearly dependent basis functions");
    }

    Ok(DMatrix::from_columns(&kept))
}

/// Solves the Roothaan equations `F C = S C e` in the basis given by `transform`.
/// Orbital energies are sorted in ascending order.
pub(super) fn roothaan(fock: &DMatrix<f64>, transform: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let transformed_fock = transform.transpose() * (fock * transform);
    let (transformed_coefficients, orbital_energies) = sorted_eigs(transformed_fock);
    (transform * transformed_coefficients, orbital_energies)
}

/// `C diag(occ) C^T`
pub(super) fn density_from_orbitals(
    coefficients: &DMatrix<f64>,
    occupations: &DVector<f64>,
) -> DMatrix<f64> {
    let n_basis = coefficients.nrows();
    symmetric_matrix(n_basis, |i, j| {
        let mut sum = 0.0;
        for (k, &occupation) in occupations.iter().enumerate() {
            if occupation != 0.0 {
                sum += occupation * coefficients[(i, k)] * coefficients[(j, k)];
            }
        }
        sum
    })
}

/// Root mean square of the entries of a density change.
pub(super) fn density_rms(change: &DMatrix<f64>) -> f64 {
    (change.norm_squared() / change.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::*;

    #[test]
    fn symmetric_matrix_mirrors_the_upper_triangle() {
        let m = symmetric_matrix(3, |i, j| (10 * i + j) as f64);
        assert_eq!(m[(2, 0)], 2.0);
        assert_eq!(m, m.transpose());
    }

    #[test]
    fn eigenvalues_are_ascending() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 0.1, 0.0, 0.1, -1.0, 0.3, 0.0, 0.3, 0.5]);
        let (vectors, values) = sorted_eigs(m.clone());

        assert!(values.as_slice().windows(2).all(|w| w[0] <= w[1]));
        for k in 0..3 {
            let residual = &m * vectors.column(k) - vectors.column(k) * values[k];
            assert_relative_eq!(residual.norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn orthogonalizer_diagonalizes_the_overlap() {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.6593, 0.6593, 1.0]);
        let x = orthogonalizer(&overlap, 1e-8).unwrap();

        let identity = x.transpose() * &overlap * &x;
        assert_relative_eq!(identity, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn linear_dependencies_are_dropped() {
        // two identical functions
        let overlap = DMatrix::from_element(2, 2, 1.0);
        let x = orthogonalizer(&overlap, 1e-8).unwrap();
        assert_eq!(x.ncols(), 1);
    }

    #[test]
    fn density_uses_occupations() {
        let c = DMatrix::identity(2, 2);
        let d = density_from_orbitals(&c, &DVector::from_column_slice(&[2.0, 0.0]));
        assert_eq!(d, DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]));
    }
}
