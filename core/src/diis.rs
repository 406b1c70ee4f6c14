use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;

struct Sample {
    error: DMatrix<f64>,
    fock: DMatrix<f64>,
}

/// Direct inversion in the iterative subspace: extrapolates a Fock matrix from
/// the most recent (error, Fock) pairs.
pub(crate) struct Diis {
    /// (Error, Vector)
    previous_samples: VecDeque<Sample>,
    space: usize,
}

impl Diis {
    /// Extrapolation starts once this many samples are stored.
    const MIN_SAMPLES: usize = 2;

    pub fn new(space: usize) -> Self {
        Self {
            previous_samples: VecDeque::with_capacity(space),
            space,
        }
    }

    /// Stores a sample and returns the extrapolated Fock matrix. Falls back to the
    /// given Fock matrix while the subspace is too small or ill-conditioned.
    pub fn fock(&mut self, error: DMatrix<f64>, fock: DMatrix<f64>) -> DMatrix<f64> {
        if self.space == 0 {
            return fock;
        }

        let latest = fock.clone();
        self.previous_samples.push_front(Sample { error, fock });
        self.previous_samples.truncate(self.space);

        self.extrapolate().unwrap_or(latest)
    }

    fn extrapolate(&self) -> Option<DMatrix<f64>> {
        let n = self.previous_samples.len();
        if n < Self::MIN_SAMPLES {
            return None;
        }

        let overlaps = DMatrix::from_fn(n, n, |i, j| {
            self.previous_samples[j]
                .error
                .dot(&self.previous_samples[i].error)
        });

        // rescale so that tiny errors close to convergence don't make the system singular
        let scale = overlaps.diagonal().max();
        if scale <= 0.0 || !scale.is_finite() {
            return None;
        }

        let matrix = DMatrix::from_fn(n + 1, n + 1, |i, j| match (i, j) {
            (i, j) if i == n && j == n => 0.0,
            (i, j) if i == n || j == n => 1.0,
            _ => overlaps[(i, j)] / scale,
        });

        let b = DVector::from_fn(n + 1, |i, _| if i == n { 1.0 } else { 0.0 });

        let solution = matrix.lu().solve(&b)?;
        if solution.iter().any(|x| !x.is_finite()) {
            return None;
        }

        Some(
            solution
                .iter()
                .enumerate()
                .take(n)
                .map(|(i, &x)| x * &self.previous_samples[i].fock)
                .sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use super::Diis;

    #[test]
    fn disabled_diis_passes_fock_through() {
        let mut diis = Diis::new(0);
        let fock = DMatrix::from_element(2, 2, 3.0);
        assert_eq!(diis.fock(DMatrix::identity(2, 2), fock.clone()), fock);
    }

    #[test]
    fn first_sample_is_not_extrapolated() {
        let mut diis = Diis::new(8);
        let fock = DMatrix::from_element(2, 2, 1.5);
        assert_eq!(diis.fock(DMatrix::identity(2, 2), fock.clone()), fock);
    }

    #[test]
    fn extrapolation_cancels_opposite_errors() {
        let mut diis = Diis::new(8);
        let error = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);

        diis.fock(error.clone(), DMatrix::from_element(2, 2, 1.0));
        let extrapolated = diis.fock(-error, DMatrix::from_element(2, 2, 3.0));

        // equal weights make the extrapolated error vanish
        assert_relative_eq!(extrapolated, DMatrix::from_element(2, 2, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn zero_errors_fall_back_to_the_latest_fock() {
        let mut diis = Diis::new(8);
        diis.fock(DMatrix::zeros(2, 2), DMatrix::from_element(2, 2, 1.0));
        let fock = diis.fock(DMatrix::zeros(2, 2), DMatrix::from_element(2, 2, 2.0));
        assert_eq!(fock, DMatrix::from_element(2, 2, 2.0));
    }
}
