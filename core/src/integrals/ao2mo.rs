//! Transformation of two-electron integrals from the atomic orbital basis to a
//! basis of molecular orbitals.
//!
//! `general(eri, [c1, c2, c3, c4])` computes
//!   (pq|rs) = sum_ijkl c1[i,p] c2[j,q] c3[k,r] c4[l,s] (ij|kl)
//! and returns it as a matrix with rows `p * n2 + q` and columns `r * n4 + s`.
//! The first index is transformed one orbital at a time, so the working set is
//! one half-transformed slice on top of the output.

use nalgebra::DMatrix;

use crate::env::megabytes_for;

use super::ElectronTensor;

/// Transforms all four indices. The columns of each matrix are the target orbitals.
pub fn general(eri: &ElectronTensor, orbitals: [&DMatrix<f64>; 4]) -> DMatrix<f64> {
    let [c1, c2, c3, c4] = orbitals;
    let (n2, n3, n4) = (c2.ncols(), c3.ncols(), c4.ncols());

    let mut output = DMatrix::zeros(c1.ncols() * n2, n3 * n4);
    for p in 0..c1.ncols() {
        let coefficients = c1.column(p).iter().copied().collect::<Vec<_>>();
        let slice = orbital_slice(eri, &coefficients, c2, c3, c4);
        output.rows_mut(p * n2, n2).copy_from(&slice);
    }
    output
}

/// (pq|rs) for a single orbital `p` of the first index, given by its
/// coefficients. Rows are `q`, columns are `r * n4 + s`.
pub fn orbital_slice(
    eri: &ElectronTensor,
    p: &[f64],
    c2: &DMatrix<f64>,
    c3: &DMatrix<f64>,
    c4: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = eri.size();
    let (n2, n3, n4) = (c2.ncols(), c3.ncols(), c4.ncols());

    // contract the first index: v[j, k*n+l] = sum_i p[i] (ij|kl)
    let mut first = DMatrix::zeros(n, n * n);
    for (j, k, l) in itertools::iproduct!(0..n, 0..n, 0..n) {
        let mut sum = 0.0;
        for (i, &coefficient) in p.iter().enumerate() {
            sum += coefficient * eri[(i, j, k, l)];
        }
        first[(j, k * n + l)] = sum;
    }

    // second index
    let half = c2.transpose() * first;

    let mut output = DMatrix::zeros(n2, n3 * n4);
    for q in 0..n2 {
        let pair = DMatrix::from_fn(n, n, |k, l| half[(q, k * n + l)]);
        let transformed = c3.transpose() * pair * c4;
        for (r, s) in itertools::iproduct!(0..n3, 0..n4) {
            output[(q, r * n4 + s)] = transformed[(r, s)];
        }
    }
    output
}

/// Memory in MB needed to transform one orbital of the first index.
pub fn slice_memory(n_basis: usize, shape: [usize; 4]) -> f64 {
    let [_, n2, n3, n4] = shape;
    megabytes_for(n_basis.pow(3) + n2 * n_basis.pow(2) + n2 * n3 * n4)
}

/// Memory in MB needed to hold the complete transformed block.
pub fn block_memory(n_basis: usize, shape: [usize; 4]) -> f64 {
    let [n1, n2, n3, n4] = shape;
    slice_memory(n_basis, shape) + megabytes_for(n1 * n2 * n3 * n4)
}
