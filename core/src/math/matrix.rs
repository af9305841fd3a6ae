use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Solve `lhs * x = rhs` for a symmetric `lhs`.
    ///
    /// Tries a Cholesky factorization first and falls back to LU; `None` when the
    /// system is singular or the solution is not finite.
    pub fn solve_symmetric(lhs: ArrayView2<f64>, rhs: ArrayView1<f64>) -> Option<Array1<f64>> {
        let n = rhs.len();
        if lhs.dim() != (n, n) {
            return None;
        }
        let matrix = DMatrix::from_fn(n, n, |i, j| lhs[[i, j]]);
        let vector = DVector::from_iterator(n, rhs.iter().copied());

        let solution = match matrix.clone().cholesky() {
            Some(cholesky) => cholesky.solve(&vector),
            None => matrix.lu().solve(&vector)?,
        };
        if solution.iter().all(|v| v.is_finite()) {
            Some(Array1::from_iter(solution.iter().copied()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn solves_positive_definite_system() {
        let lhs = array![[4.0, 1.0], [1.0, 3.0]];
        let rhs = array![1.0, 2.0];
        let x = MatrixHelper::solve_symmetric(lhs.view(), rhs.view()).unwrap();
        let check = lhs.dot(&x);
        assert!((check[0] - 1.0).abs() < 1e-12);
        assert!((check[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn indefinite_system_uses_lu() {
        let lhs = array![[0.0, 1.0], [1.0, 0.0]];
        let rhs = array![2.0, 3.0];
        let x = MatrixHelper::solve_symmetric(lhs.view(), rhs.view()).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_system_yields_none() {
        let lhs = array![[1.0, 1.0], [1.0, 1.0]];
        let rhs = array![1.0, 2.0];
        assert!(MatrixHelper::solve_symmetric(lhs.view(), rhs.view()).is_none());
    }

    #[test]
    fn shape_mismatch_yields_none() {
        let lhs = array![[1.0, 0.0], [0.0, 1.0]];
        let rhs = array![1.0, 2.0, 3.0];
        assert!(MatrixHelper::solve_symmetric(lhs.view(), rhs.view()).is_none());
    }
}
