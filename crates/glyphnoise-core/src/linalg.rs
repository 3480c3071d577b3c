//! Geometric and statistical primitives over glyph vectors.
//!
//! All least-squares solves go through [`PreparedSystem`], which caches the
//! projector of a design matrix so the Monte-Carlo loop can re-solve against
//! many noisy targets with one matrix-vector product each. Projectors are built
//! from the small normal matrix `AᵀA` (or `AᵀW⁻¹A`), never from the tall `A`.

use crate::error::{AnalysisError, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Angle assigned when either vector has zero norm.
pub const ORTHOGONAL_DEGREES: f64 = 90.0;

/// Angle between two vectors in degrees, in `[0, 180]`.
///
/// Zero-norm input yields exactly [`ORTHOGONAL_DEGREES`].
pub fn cosine_angle(v1: &DVector<f64>, v2: &DVector<f64>) -> Result<f64> {
    if v1.len() != v2.len() {
        return Err(AnalysisError::DimensionMismatch {
            context: "cosine angle",
            expected: v1.len(),
            actual: v2.len(),
        });
    }
    let n1 = v1.norm();
    let n2 = v2.norm();
    if n1 == 0.0 || n2 == 0.0 {
        return Ok(ORTHOGONAL_DEGREES);
    }
    let cos_theta = (v1.dot(v2) / (n1 * n2)).clamp(-1.0, 1.0);
    Ok(cos_theta.acos().to_degrees())
}

/// Unbiased (N - 1) sample covariance of a set of vectors.
///
/// The vectors are the rows of an N x D observation matrix; the result is
/// D x D with one row/column per pixel position.
pub fn covariance_matrix(vectors: &[DVector<f64>]) -> Result<DMatrix<f64>> {
    let n = vectors.len();
    if n < 2 {
        return Err(AnalysisError::Validation(format!(
            "covariance needs at least 2 vectors, got {n}"
        )));
    }
    let d = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != d) {
        return Err(AnalysisError::DimensionMismatch {
            context: "covariance matrix",
            expected: d,
            actual: bad.len(),
        });
    }

    let mut centered = DMatrix::from_fn(n, d, |i, j| vectors[i][j]);
    let means = centered.row_mean();
    for mut row in centered.row_iter_mut() {
        row -= &means;
    }
    Ok(centered.tr_mul(&centered) / (n - 1) as f64)
}

/// Eigenvalues at or below this fraction of the largest magnitude count as zero.
pub const EIGEN_RCOND: f64 = 1e-12;

/// Iteration cap for the eigen-decomposition.
const MAX_EIGEN_ITERATIONS: usize = 1_000;

/// Moore-Penrose pseudo-inverse of a symmetric matrix via its eigen-decomposition.
///
/// Only the lower triangle is read. Returns the inverse together with a flag
/// telling whether any eigenvalue fell below the [`EIGEN_RCOND`] cutoff
/// (i.e. the matrix was numerically singular).
pub fn symmetric_pseudo_inverse(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, bool)> {
    if m.is_empty() {
        return Err(AnalysisError::Validation("cannot invert an empty matrix".into()));
    }
    if !m.is_square() {
        return Err(AnalysisError::DimensionMismatch {
            context: "symmetric matrix columns",
            expected: m.nrows(),
            actual: m.ncols(),
        });
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Solver("matrix has non-finite entries".into()));
    }

    let eigen = SymmetricEigen::try_new(m.clone(), f64::EPSILON, MAX_EIGEN_ITERATIONS)
        .ok_or_else(|| AnalysisError::Solver("eigen-decomposition did not converge".into()))?;
    let cutoff = eigen.eigenvalues.amax() * EIGEN_RCOND;
    let singular = eigen.eigenvalues.iter().any(|l| l.abs() <= cutoff);
    let inverted = eigen
        .eigenvalues
        .map(|l| if l.abs() > cutoff { l.recip() } else { 0.0 });

    let v = &eigen.eigenvectors;
    let pinv = v * DMatrix::from_diagonal(&inverted) * v.transpose();
    if pinv.iter().any(|x| !x.is_finite()) {
        return Err(AnalysisError::Solver("pseudo-inverse is not finite".into()));
    }
    Ok((pinv, singular))
}

/// Inverse of a least-squares weight (covariance) matrix.
#[derive(Clone, Debug)]
pub struct WeightInverse {
    inverse: DMatrix<f64>,
    singular: bool,
}

impl WeightInverse {
    /// Invert `w`, falling back to the pseudo-inverse when it is singular.
    pub fn new(w: &DMatrix<f64>) -> Result<Self> {
        if !w.is_square() {
            return Err(AnalysisError::DimensionMismatch {
                context: "weight matrix columns",
                expected: w.nrows(),
                actual: w.ncols(),
            });
        }
        let (inverse, singular) = symmetric_pseudo_inverse(w)?;
        if singular {
            tracing::debug!(dim = w.nrows(), "singular weight matrix, using pseudo-inverse");
        }
        Ok(Self { inverse, singular })
    }

    /// Whether the pseudo-inverse fallback was used.
    #[must_use]
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// The (pseudo-)inverse.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.inverse
    }
}

/// A least-squares design matrix with its solution projector precomputed.
///
/// Solving against a target `b` is `x = P * b` where
/// - ordinary: `P = (AᵀA)⁺ Aᵀ`, the minimum-norm solution when `A` is rank deficient,
/// - weighted: `P = (Aᵀ W⁻¹ A)⁺ Aᵀ W⁻¹`, minimizing `(Ax - b)ᵀ W⁻¹ (Ax - b)`.
#[derive(Clone, Debug)]
pub struct PreparedSystem {
    projector: DMatrix<f64>,
    rows: usize,
}

impl PreparedSystem {
    /// Prepare an ordinary least-squares system.
    pub fn ordinary(a: &DMatrix<f64>) -> Result<Self> {
        let (normal_pinv, _) = symmetric_pseudo_inverse(&a.tr_mul(a))?;
        Ok(Self {
            projector: normal_pinv * a.transpose(),
            rows: a.nrows(),
        })
    }

    /// Prepare a generalized least-squares system with weight inverse `w_inv`.
    pub fn weighted(a: &DMatrix<f64>, w_inv: &WeightInverse) -> Result<Self> {
        let w = w_inv.matrix();
        if w.nrows() != a.nrows() {
            return Err(AnalysisError::DimensionMismatch {
                context: "weight matrix rows",
                expected: a.nrows(),
                actual: w.nrows(),
            });
        }
        let at_w = a.tr_mul(w);
        let normal = &at_w * a;
        let normal = (&normal + normal.transpose()) * 0.5;
        let (normal_pinv, _) = symmetric_pseudo_inverse(&normal)?;
        Ok(Self {
            projector: normal_pinv * at_w,
            rows: a.nrows(),
        })
    }

    /// Solve for target `b`.
    pub fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        if b.len() != self.rows {
            return Err(AnalysisError::DimensionMismatch {
                context: "least squares target",
                expected: self.rows,
                actual: b.len(),
            });
        }
        let x = &self.projector * b;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Solver(
                "least-squares solution is not finite".into(),
            ));
        }
        Ok(x)
    }
}

/// One-shot least squares: `argmin_x ||Ax - b||`, or the `W`-weighted form when `weight` is given.
pub fn least_squares(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    weight: Option<&DMatrix<f64>>,
) -> Result<DVector<f64>> {
    if a.nrows() != b.len() {
        return Err(AnalysisError::DimensionMismatch {
            context: "least squares target",
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    let system = match weight {
        None => PreparedSystem::ordinary(a)?,
        Some(w) => PreparedSystem::weighted(a, &WeightInverse::new(w)?)?,
    };
    system.solve(b)
}

/// Euclidean norm of the fit residual `A x - b`.
pub fn residual_norm(a: &DMatrix<f64>, x: &DVector<f64>, b: &DVector<f64>) -> Result<f64> {
    if a.ncols() != x.len() || a.nrows() != b.len() {
        return Err(AnalysisError::DimensionMismatch {
            context: "residual",
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    Ok((a * x - b).norm())
}

/// Whether a noisy solution strayed further than `threshold` (Euclidean) from the reference.
#[must_use]
pub fn error_occurred(x_ref: &DVector<f64>, x_noisy: &DVector<f64>, threshold: f64) -> bool {
    (x_ref - x_noisy).norm() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(data: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(data)
    }

    #[test]
    fn test_angle_special_cases() {
        let a = v(&[1.0, 0.0, 1.0, 1.0]);
        assert!(cosine_angle(&a, &a).unwrap().abs() < 1e-4);
        assert!((cosine_angle(&a, &(-&a)).unwrap() - 180.0).abs() < 1e-4);
        assert_eq!(cosine_angle(&a, &v(&[0.0; 4])).unwrap(), 90.0);
        assert_eq!(cosine_angle(&v(&[0.0; 4]), &v(&[0.0; 4])).unwrap(), 90.0);
        assert!((cosine_angle(&v(&[1.0, 0.0]), &v(&[0.0, 1.0])).unwrap() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_dimension_mismatch() {
        let err = cosine_angle(&v(&[1.0, 2.0]), &v(&[1.0])).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_covariance_two_observations() {
        // Rows [1, 2] and [3, 6]: var(x0) = 2, var(x1) = 8, cov = 4.
        let c = covariance_matrix(&[v(&[1.0, 2.0]), v(&[3.0, 6.0])]).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert!((c[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((c[(1, 1)] - 8.0).abs() < 1e-12);
        assert!((c[(0, 1)] - 4.0).abs() < 1e-12);
        assert!((c[(1, 0)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_needs_two() {
        assert!(covariance_matrix(&[v(&[1.0])]).is_err());
        assert!(covariance_matrix(&[v(&[1.0]), v(&[1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_least_squares_recovers_column() {
        let a_col = v(&[1.0, 0.0, 1.0, 1.0, 0.0]);
        let b_col = v(&[0.0, 1.0, 1.0, 0.0, 0.0]);
        let a = DMatrix::from_columns(&[a_col.clone(), b_col]);
        let x = least_squares(&a, &a_col, None).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!(x[1].abs() < 1e-10);
        assert!(residual_norm(&a, &x, &a_col).unwrap() < 1e-10);
    }

    #[test]
    fn test_least_squares_rank_deficient_min_norm() {
        // Identical columns: the minimum-norm split is (0.5, 0.5).
        let col = v(&[1.0, 1.0, 0.0, 1.0]);
        let a = DMatrix::from_columns(&[col.clone(), col.clone()]);
        let x = least_squares(&a, &col, None).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-10);
        assert!((x[1] - 0.5).abs() < 1e-10);
    }

    fn duplicate_columns(len: usize) -> (DMatrix<f64>, DVector<f64>) {
        let col = DVector::from_element(len, 1.0);
        (DMatrix::from_columns(&[col.clone(), col.clone()]), col)
    }

    #[test]
    fn test_duplicate_columns_at_grid_sizes() {
        for len in [9, 35, 100, 600] {
            let (a, b) = duplicate_columns(len);
            let x = least_squares(&a, &b, None).unwrap();
            assert!((x[0] - 0.5).abs() < 1e-10, "len {len}: {x}");
            assert!((x[1] - 0.5).abs() < 1e-10, "len {len}: {x}");
            assert!(residual_norm(&a, &x, &b).unwrap() < 1e-9);

            let weighted = least_squares(&a, &b, Some(&DMatrix::identity(len, len))).unwrap();
            assert!((weighted - &x).norm() < 1e-10);
        }
    }

    #[test]
    fn test_duplicate_glyph_pattern_reproduced() {
        // A 5x7 dot-matrix "A" paired with itself.
        let bits = [
            0, 1, 1, 1, 1, 1, 1, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0,
            0, 1, 1, 1, 1, 1, 1,
        ];
        let col = DVector::from_iterator(35, bits.iter().map(|&b| f64::from(b)));
        let a = DMatrix::from_columns(&[col.clone(), col.clone()]);
        let system = PreparedSystem::ordinary(&a).unwrap();
        let x = system.solve(&col).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-10 && (x[1] - 0.5).abs() < 1e-10);
        assert!(residual_norm(&a, &x, &col).unwrap() < 1e-9);
    }

    #[test]
    fn test_non_finite_matrix_is_a_solver_error() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        let err = symmetric_pseudo_inverse(&m).unwrap_err();
        assert!(matches!(err, AnalysisError::Solver(_)));
    }

    #[test]
    fn test_least_squares_zero_matrix() {
        let a = DMatrix::<f64>::zeros(4, 2);
        let x = least_squares(&a, &v(&[0.0; 4]), None).unwrap();
        assert_eq!(x, v(&[0.0, 0.0]));
    }

    #[test]
    fn test_least_squares_shape_mismatch() {
        let a = DMatrix::<f64>::identity(3, 2);
        let err = least_squares(&a, &v(&[1.0, 2.0]), None).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_weighted_identity_matches_ordinary() {
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 2.0, 1.0]);
        let b = v(&[1.0, 2.0, 0.5, 3.0]);
        let ordinary = least_squares(&a, &b, None).unwrap();
        let weighted = least_squares(&a, &b, Some(&DMatrix::identity(4, 4))).unwrap();
        assert!((ordinary - weighted).norm() < 1e-10);
    }

    #[test]
    fn test_singular_weight_falls_back() {
        let w = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let inv = WeightInverse::new(&w).unwrap();
        assert!(inv.is_singular());
        // pinv([[1,1],[1,1]]) = [[0.25,0.25],[0.25,0.25]]
        assert!((inv.matrix()[(0, 1)] - 0.25).abs() < 1e-12);

        let regular = WeightInverse::new(&DMatrix::from_diagonal(&v(&[2.0, 4.0]))).unwrap();
        assert!(!regular.is_singular());
        assert!((regular.matrix()[(1, 1)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_weight_matrix_wrong_size() {
        let a = DMatrix::<f64>::identity(3, 2);
        let err = least_squares(&a, &v(&[1.0, 0.0, 0.0]), Some(&DMatrix::identity(2, 2)));
        assert!(err.is_err());
    }

    #[test]
    fn test_error_occurred_threshold() {
        let x = v(&[0.5, 0.5]);
        assert!(!error_occurred(&x, &v(&[0.55, 0.5]), 0.1));
        assert!(error_occurred(&x, &v(&[0.5, 0.7]), 0.1));
    }

    proptest! {
        #[test]
        fn prop_angle_is_symmetric_and_bounded(
            a in prop::collection::vec(-10.0..10.0f64, 8),
            b in prop::collection::vec(-10.0..10.0f64, 8)
        ) {
            let (a, b) = (v(&a), v(&b));
            let ab = cosine_angle(&a, &b).unwrap();
            let ba = cosine_angle(&b, &a).unwrap();
            prop_assert!((0.0..=180.0).contains(&ab));
            prop_assert!((ab - ba).abs() < 1e-9);
        }

        #[test]
        fn prop_target_column_is_reproduced(
            bits_a in prop::collection::vec(0..=1u8, 12),
            bits_b in prop::collection::vec(0..=1u8, 12)
        ) {
            let a_col = DVector::from_iterator(12, bits_a.iter().map(|&x| f64::from(x)));
            let b_col = DVector::from_iterator(12, bits_b.iter().map(|&x| f64::from(x)));
            let a = DMatrix::from_columns(&[a_col.clone(), b_col]);
            let x = least_squares(&a, &a_col, None).unwrap();
            prop_assert!(residual_norm(&a, &x, &a_col).unwrap() < 1e-9);
        }

        #[test]
        fn prop_duplicate_column_splits_evenly(
            bits in prop::collection::vec(0..=1u8, 9..=400)
        ) {
            let col = DVector::from_iterator(bits.len(), bits.iter().map(|&x| f64::from(x)));
            let a = DMatrix::from_columns(&[col.clone(), col.clone()]);
            let x = least_squares(&a, &col, None).unwrap();
            let expected = if col.norm() == 0.0 { 0.0 } else { 0.5 };
            prop_assert!((x[0] - expected).abs() < 1e-9 && (x[1] - expected).abs() < 1e-9);
            prop_assert!(residual_norm(&a, &x, &col).unwrap() < 1e-9);
        }
    }
}
