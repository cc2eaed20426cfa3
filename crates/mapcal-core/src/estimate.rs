use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::AffineTransform;

/// Smallest number of correspondences that pins down a 2-D affine transform.
pub const MIN_CORRESPONDENCES: usize = 3;

/// Relative singular-value threshold below which the normalized design
/// matrix is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-9;

/// Errors returned by the estimators.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("source has {source_len} points but target has {target_len}")]
    LengthMismatch {
        source_len: usize,
        target_len: usize,
    },
    #[error("need at least {required} correspondences, got {got}")]
    InsufficientCorrespondences { got: usize, required: usize },
    #[error("correspondence {index} has a non-finite coordinate")]
    NonFiniteInput { index: usize },
    #[error("source points are degenerate (collinear or coincident)")]
    DegenerateGeometry,
}

/// Degrees of freedom allowed in the fitted transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformModel {
    /// General affine map, 6 DOF.
    #[default]
    Affine,
    /// Rotation, uniform scale and translation, 4 DOF.
    Similarity,
    /// Rotation and translation, 3 DOF.
    Rigid,
}

/// Estimated transform plus its residuals on the fitted correspondences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformFit {
    pub transform: AffineTransform,
    pub model: TransformModel,
    /// Root-mean-square distance between `T(source[i])` and `target[i]`.
    pub rms_residual: f64,
    /// Largest such distance.
    pub max_residual: f64,
}

/// Estimate the affine `T` minimizing `Σ |T(source[i]) - target[i]|²`.
///
/// With exactly three non-collinear points the fit is exact. Fails with
/// [`EstimateError::DegenerateGeometry`] when the source points are
/// collinear or coincident.
pub fn estimate_affine(
    source: &[Point2<f64>],
    target: &[Point2<f64>],
) -> Result<AffineTransform, EstimateError> {
    fit_transform(source, target, TransformModel::Affine).map(|fit| fit.transform)
}

/// Fit a transform of the requested model mapping `source` onto `target`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(source, target), fields(n = source.len()))
)]
pub fn fit_transform(
    source: &[Point2<f64>],
    target: &[Point2<f64>],
    model: TransformModel,
) -> Result<TransformFit, EstimateError> {
    check_correspondences(source, target)?;

    let transform = match model {
        TransformModel::Affine => solve_affine(source, target)?,
        TransformModel::Similarity => solve_similarity(source, target, true)?,
        TransformModel::Rigid => solve_similarity(source, target, false)?,
    };

    let (rms_residual, max_residual) = residuals(&transform, source, target);
    log::debug!(
        "fitted {:?} transform to {} correspondences (rms={:.3e}, max={:.3e})",
        model,
        source.len(),
        rms_residual,
        max_residual
    );

    Ok(TransformFit {
        transform,
        model,
        rms_residual,
        max_residual,
    })
}

fn check_correspondences(
    source: &[Point2<f64>],
    target: &[Point2<f64>],
) -> Result<(), EstimateError> {
    if source.len() != target.len() {
        return Err(EstimateError::LengthMismatch {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    if source.len() < MIN_CORRESPONDENCES {
        return Err(EstimateError::InsufficientCorrespondences {
            got: source.len(),
            required: MIN_CORRESPONDENCES,
        });
    }
    let finite = |p: &Point2<f64>| p.x.is_finite() && p.y.is_finite();
    if let Some(index) = source
        .iter()
        .zip(target)
        .position(|(s, t)| !finite(s) || !finite(t))
    {
        return Err(EstimateError::NonFiniteInput { index });
    }
    Ok(())
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let c = centroid(pts);

    let n = pts.len() as f64;
    let mean_dist = pts.iter().map(|p| (p - c).norm()).sum::<f64>() / n;

    let t = hartley_normalization(c.x, c.y, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn centroid(pts: &[Point2<f64>]) -> Point2<f64> {
    let sum = pts
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + p.coords);
    Point2::from(sum / pts.len() as f64)
}

/// Least-squares affine solve on Hartley-normalized points.
///
/// Each correspondence contributes one row `[x y 1]` to `A`; the two target
/// coordinates form the two right-hand-side columns, so both rows of the
/// affine matrix come out of one SVD.
fn solve_affine(
    source: &[Point2<f64>],
    target: &[Point2<f64>],
) -> Result<AffineTransform, EstimateError> {
    let (src, t_src) = normalize_points(source);
    let (dst, t_dst) = normalize_points(target);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(n, 3);
    let mut b = DMatrix::<f64>::zeros(n, 2);
    for (k, (s, d)) in src.iter().zip(&dst).enumerate() {
        a[(k, 0)] = s.x;
        a[(k, 1)] = s.y;
        a[(k, 2)] = 1.0;
        b[(k, 0)] = d.x;
        b[(k, 1)] = d.y;
    }

    let svd = a.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let sigma_min = svd.singular_values.min();
    if sigma_max <= 0.0 || sigma_min / sigma_max < RANK_TOLERANCE {
        log::debug!(
            "rank-deficient affine system (sigma_min={sigma_min:.3e}, sigma_max={sigma_max:.3e})"
        );
        return Err(EstimateError::DegenerateGeometry);
    }

    // x is 3x2: column 0 holds the first affine row, column 1 the second.
    let x = svd
        .solve(&b, 0.0)
        .map_err(|_| EstimateError::DegenerateGeometry)?;

    let hn = Matrix3::<f64>::new(
        x[(0, 0)], x[(1, 0)], x[(2, 0)], //
        x[(0, 1)], x[(1, 1)], x[(2, 1)], //
        0.0, 0.0, 1.0,
    );

    // Denormalize: T = T_dst^{-1} * Tn * T_src
    let Some(t_dst_inv) = t_dst.try_inverse() else {
        return Err(EstimateError::DegenerateGeometry);
    };
    let m = t_dst_inv * hn * t_src;

    let linear = Matrix2::new(m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]);
    let translation = Vector2::new(m[(0, 2)], m[(1, 2)]);
    finite_transform(linear, translation)
}

/// Closed-form Umeyama alignment; `with_scale = false` gives the Kabsch
/// (rigid) solution.
fn solve_similarity(
    source: &[Point2<f64>],
    target: &[Point2<f64>],
    with_scale: bool,
) -> Result<AffineTransform, EstimateError> {
    let n = source.len() as f64;
    let mu_s = centroid(source);
    let mu_d = centroid(target);

    let mut var_s = 0.0;
    let mut cov = Matrix2::<f64>::zeros();
    for (s, d) in source.iter().zip(target) {
        let ds = s - mu_s;
        let dd = d - mu_d;
        var_s += ds.norm_squared();
        cov += dd * ds.transpose();
    }
    var_s /= n;
    cov /= n;

    // All source points coincide: rotation and scale are undetermined.
    let extent = 1.0 + mu_s.coords.norm_squared();
    if var_s <= RANK_TOLERANCE * RANK_TOLERANCE * extent {
        return Err(EstimateError::DegenerateGeometry);
    }

    let svd = cov.svd(true, true);
    let u = svd.u.ok_or(EstimateError::DegenerateGeometry)?;
    let v_t = svd.v_t.ok_or(EstimateError::DegenerateGeometry)?;

    let mut d = Matrix2::<f64>::identity();
    if u.determinant() * v_t.determinant() < 0.0 {
        d[(1, 1)] = -1.0;
    }
    let rotation = u * d * v_t;

    let scale = if with_scale {
        (Matrix2::from_diagonal(&svd.singular_values) * d).trace() / var_s
    } else {
        1.0
    };

    let linear = rotation * scale;
    let translation = mu_d.coords - linear * mu_s.coords;
    finite_transform(linear, translation)
}

fn finite_transform(
    linear: Matrix2<f64>,
    translation: Vector2<f64>,
) -> Result<AffineTransform, EstimateError> {
    if linear.iter().chain(&translation).all(|v| v.is_finite()) {
        Ok(AffineTransform::new(linear, translation))
    } else {
        Err(EstimateError::DegenerateGeometry)
    }
}

fn residuals(t: &AffineTransform, source: &[Point2<f64>], target: &[Point2<f64>]) -> (f64, f64) {
    let mut sum_sq = 0.0;
    let mut max = 0.0_f64;
    for (s, d) in source.iter().zip(target) {
        let r = (t.apply(*s) - d).norm();
        sum_sq += r * r;
        max = max.max(r);
    }
    ((sum_sq / source.len() as f64).sqrt(), max)
}
