use std::ops::Index;

use nalgebra::DMatrix;
use smallvec::SmallVec;

/// An integral index used in the two-electron integrals of a basis set.
///
/// The index represents the four indices (i, j, k, l) of a two-electron integral
/// in chemists' notation:
///   (ij|kl) = int i(1) j(1) 1/r12 k(2) l(2)
///
/// For real orbitals the integral is invariant under i <-> j, k <-> l and
/// (ij) <-> (kl). An index is always stored in canonical order (i <= j, k <= l and
/// the packed pair index of (i, j) not above that of (k, l)), so all eight
/// equivalent indices share one storage slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IntegralIndex(usize, usize, usize, usize);

impl IntegralIndex {
    /// Creates a new integral index with the given indices.
    pub const fn new(index: (usize, usize, usize, usize)) -> Self {
        let (i, j, k, l) = Self::correct_order(index);
        Self(i, j, k, l)
    }

    /// Returns the indices with the correct order, such that ij <= kl.
    #[inline(always)]
    const fn correct_order(
        (i, j, k, l): (usize, usize, usize, usize),
    ) -> (usize, usize, usize, usize) {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        let (k, l) = if k <= l { (k, l) } else { (l, k) };

        if pair_index(i, j) <= pair_index(k, l) {
            (i, j, k, l)
        } else {
            (k, l, i, j)
        }
    }

    pub fn indices(&self) -> (usize, usize, usize, usize) {
        let &Self(i, j, k, l) = self;
        (i, j, k, l)
    }

    /// Position in packed storage.
    pub fn linear(&self) -> usize {
        let &Self(i, j, k, l) = self;
        let ij = pair_index(i, j);
        let kl = pair_index(k, l);
        // ij <= kl holds for canonical indices
        kl * (kl + 1) / 2 + ij
    }

    /// All distinct index tuples that refer to this integral.
    pub fn equivalents(&self) -> SmallVec<[(usize, usize, usize, usize); 8]> {
        let &Self(i, j, k, l) = self;
        let mut out = SmallVec::new();
        for candidate in [
            (i, j, k, l),
            (j, i, k, l),
            (i, j, l, k),
            (j, i, l, k),
            (k, l, i, j),
            (l, k, i, j),
            (k, l, j, i),
            (l, k, j, i),
        ] {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }
}

impl std::fmt::Display for IntegralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let &Self(i, j, k, l) = self;
        write!(f, "({} {}|{} {})", i, j, k, l)
    }
}

/// Packed index of the pair (i, j) with i <= j.
#[inline(always)]
const fn pair_index(i: usize, j: usize) -> usize {
    j * (j + 1) / 2 + i
}

/// Number of packed slots needed for `size` basis functions.
pub(crate) fn packed_len(size: usize) -> usize {
    let pairs = size * (size + 1) / 2;
    pairs * (pairs + 1) / 2
}

/// Electron-electron repulsion integrals over a basis of real functions, stored
/// once per set of symmetry-equivalent indices.
#[derive(Clone, Debug, PartialEq)]
pub struct ElectronTensor {
    data: Vec<f64>,
    /// side length
    size: usize,
}

impl ElectronTensor {
    /// A tensor of zeros.
    pub fn zeros(size: usize) -> Self {
        Self {
            data: vec![0.0; packed_len(size)],
            size,
        }
    }

    /// Builds the tensor by evaluating `func` once for every unique integral.
    pub fn from_fn(size: usize, mut func: impl FnMut(usize, usize, usize, usize) -> f64) -> Self {
        let mut tensor = Self::zeros(size);
        for l in 0..size {
            for k in 0..=l {
                for j in 0..size {
                    for i in 0..=j {
                        let index = IntegralIndex::new((i, j, k, l));
                        // every canonical index is visited exactly once
                        if index.indices() == (i, j, k, l) {
                            let integral = func(i, j, k, l);
                            log::trace!("ERI {index} = {integral:<1.8}");
                            tensor.data[index.linear()] = integral;
                        }
                    }
                }
            }
        }
        tensor
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored (unique) integrals.
    pub fn n_unique(&self) -> usize {
        self.data.len()
    }

    /// Sets the integral (ij|kl) and all its symmetry-equivalent entries.
    pub fn set(&mut self, index: (usize, usize, usize, usize), value: f64) {
        let linear = IntegralIndex::new(index).linear();
        self.data[linear] = value;
    }

    /// Iterates over all unique integrals in canonical order.
    pub fn iter_unique(&self) -> impl Iterator<Item = (IntegralIndex, f64)> + '_ {
        let size = self.size;
        itertools::iproduct!(0..size, 0..size, 0..size, 0..size)
            .map(|(l, k, j, i)| (i, j, k, l))
            .filter(|&(i, j, k, l)| IntegralIndex::new((i, j, k, l)).indices() == (i, j, k, l))
            .map(|index| {
                let index = IntegralIndex::new(index);
                (index, self[index])
            })
    }

    /// Expands the packed integrals into a dense `n^2 x n^2` supermatrix with rows
    /// indexed by (ij) and columns by (kl), pair index `i * n + j`.
    pub fn to_supermatrix(&self) -> DMatrix<f64> {
        let n = self.size;
        let mut dense = DMatrix::zeros(n * n, n * n);
        for (index, value) in self.iter_unique() {
            for (i, j, k, l) in index.equivalents() {
                dense[(i * n + j, k * n + l)] = value;
            }
        }
        dense
    }
}

impl Index<(usize, usize, usize, usize)> for ElectronTensor {
    type Output = f64;

    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        let index = IntegralIndex::new(index);
        &self.data[index.linear()]
    }
}

impl Index<IntegralIndex> for ElectronTensor {
    type Output = f64;

    fn index(&self, index: IntegralIndex) -> &Self::Output {
        &self.data[index.linear()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_indices_share_a_slot() {
        let canonical = IntegralIndex::new((0, 2, 1, 1));
        for permutation in [(2, 0, 1, 1), (1, 1, 0, 2), (1, 1, 2, 0)] {
            assert_eq!(IntegralIndex::new(permutation), canonical);
        }
        // pair (1 1) packs before pair (0 2)
        assert_eq!(canonical.indices(), (1, 1, 0, 2));
        assert_ne!(canonical.linear(), IntegralIndex::new((0, 0, 0, 2)).linear());
        assert_eq!(canonical.equivalents().len(), 4);
    }

    #[test]
    fn packed_positions_are_unique() {
        let size = 4;
        let mut seen = vec![false; packed_len(size)];
        for (i, j, k, l) in itertools::iproduct!(0..size, 0..size, 0..size, 0..size) {
            let index = IntegralIndex::new((i, j, k, l));
            if index.indices() == (i, j, k, l) {
                assert!(!seen[index.linear()], "slot for {index} used twice");
                seen[index.linear()] = true;
            }
        }
        assert!(seen.into_iter().all(|used| used));
    }

    /// Reference dense tensor keyed independently of the packed layout.
    fn dense_reference(size: usize) -> Vec<f64> {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        use std::collections::HashMap;

        let mut rng = StdRng::seed_from_u64(size as u64);
        let mut values = HashMap::new();
        let mut dense = vec![0.0; size.pow(4)];
        for (i, j, k, l) in itertools::iproduct!(0..size, 0..size, 0..size, 0..size) {
            let bra = (i.min(j), i.max(j));
            let ket = (k.min(l), k.max(l));
            let key = (bra.min(ket), bra.max(ket));
            let value = *values.entry(key).or_insert_with(|| rng.gen_range(-1.0..1.0));
            dense[((i * size + j) * size + k) * size + l] = value;
        }
        assert_eq!(values.len(), packed_len(size));
        dense
    }

    #[test]
    fn packed_storage_matches_dense_tensor() {
        for size in 1..=6 {
            let dense = dense_reference(size);
            let at = |i: usize, j: usize, k: usize, l: usize| {
                dense[((i * size + j) * size + k) * size + l]
            };
            let tensor = ElectronTensor::from_fn(size, at);

            let mut assigned = ElectronTensor::zeros(size);
            for (i, j, k, l) in itertools::iproduct!(0..size, 0..size, 0..size, 0..size) {
                assigned.set((i, j, k, l), at(i, j, k, l));
            }

            for (i, j, k, l) in itertools::iproduct!(0..size, 0..size, 0..size, 0..size) {
                assert_eq!(tensor[(i, j, k, l)], at(i, j, k, l), "({i} {j}|{k} {l})");
                assert_eq!(assigned[(i, j, k, l)], at(i, j, k, l), "({i} {j}|{k} {l})");
            }

            let n = size;
            let supermatrix = tensor.to_supermatrix();
            for (i, j, k, l) in itertools::iproduct!(0..n, 0..n, 0..n, 0..n) {
                assert_eq!(supermatrix[(i * n + j, k * n + l)], at(i, j, k, l));
            }
        }
    }

    #[test]
    fn set_is_visible_through_every_permutation() {
        let mut tensor = ElectronTensor::zeros(3);
        tensor.set((2, 1, 0, 2), 0.25);

        for (i, j, k, l) in IntegralIndex::new((2, 1, 0, 2)).equivalents() {
            assert_eq!(tensor[(i, j, k, l)], 0.25);
        }
        assert_eq!(tensor[(0, 0, 0, 0)], 0.0);
    }

    #[test]
    fn from_fn_visits_unique_integrals_once() {
        let mut calls = 0;
        let tensor = ElectronTensor::from_fn(3, |i, j, k, l| {
            calls += 1;
            (i + 10 * j + 100 * k + 1000 * l) as f64
        });

        assert_eq!(calls, tensor.n_unique());
        assert_eq!(tensor.iter_unique().count(), tensor.n_unique());
        assert_eq!(tensor[(1, 0, 2, 2)], 2210.0);
    }

    #[test]
    fn supermatrix_is_symmetric() {
        let tensor = ElectronTensor::from_fn(3, |i, j, k, l| 1.0 + (i * j + k + l) as f64);
        let dense = tensor.to_supermatrix();
        assert_eq!(dense, dense.transpose());
        assert_eq!(dense[(1 * 3 + 2, 0)], tensor[(1, 2, 0, 0)]);
    }
}
